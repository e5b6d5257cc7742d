/*
 * Copyright 2025 clickhouse-optimizer
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::time::Duration;

/// One row of `system.merges` for the partition being optimized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveMerge {
    /// Fraction done, `0.0..=1.0`.
    pub progress: f64,
    /// Seconds since the merge started on the server.
    pub elapsed: f64,
}

/// What one poll of the merges registry saw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MergeObservation {
    Active(ActiveMerge),
    /// No merge, and our `OPTIMIZE` invocation has returned (or none was needed).
    Absent,
    /// No merge yet, but our `OPTIMIZE` invocation has not returned: the server may
    /// still be waiting to assign it.
    Unconfirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    Pending,
    CommandIssued,
    Polling,
    Completed,
    TimedOut,
}

impl PartitionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PartitionState::Completed | PartitionState::TimedOut)
    }
}

/// Decides the next state after a poll taken `elapsed` after command issuance.
///
/// Absence is success even though it cannot tell "merge finished" from "nothing to
/// merge".
pub fn transition(
    elapsed: Duration,
    observation: &MergeObservation,
    timeout: Duration,
) -> PartitionState {
    match observation {
        MergeObservation::Absent => PartitionState::Completed,
        _ if elapsed >= timeout => PartitionState::TimedOut,
        MergeObservation::Active(_) | MergeObservation::Unconfirmed => PartitionState::Polling,
    }
}
