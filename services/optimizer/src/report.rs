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

use clickhouse_optimizer_core::driver::format_duration;
use clickhouse_optimizer_core::{OptimizationOutcome, OutcomeStatus, RunReport};

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_INTERRUPTED: u8 = 130;

/// Timed-out partitions do not fail the run.
pub fn exit_code(report: &RunReport) -> u8 {
    if report.interrupted {
        EXIT_INTERRUPTED
    } else {
        EXIT_OK
    }
}

fn outcome_line(outcome: &OptimizationOutcome) -> String {
    format!(
        "{}: {} in {}",
        outcome.partition,
        outcome.status,
        format_duration(outcome.elapsed)
    )
}

pub fn total_line(report: &RunReport) -> String {
    format!(
        "{}: {} completed, {} timed out, {} total{}",
        report.table,
        report.completed_count(),
        report.timed_out_count(),
        format_duration(report.total_elapsed()),
        if report.interrupted { " (interrupted)" } else { "" }
    )
}

pub fn summary_lines(report: &RunReport) -> Vec<String> {
    let mut lines: Vec<String> = report.outcomes.iter().map(outcome_line).collect();
    lines.push(total_line(report));
    lines
}

/// Timed-out partitions are logged at warn, the rest of the summary at info.
pub fn log_summary(report: &RunReport) {
    for outcome in &report.outcomes {
        match outcome.status {
            OutcomeStatus::Completed => tracing::info!("{}", outcome_line(outcome)),
            OutcomeStatus::TimedOut => {
                tracing::warn!("{}, merge may still be running", outcome_line(outcome))
            }
        }
    }
    tracing::info!("{}", total_line(report));
}
