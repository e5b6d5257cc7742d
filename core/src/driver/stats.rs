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

use super::{OptimizationOutcome, OutcomeStatus};

/// Running totals for one driver run, used to project the time left.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStatistics {
    pub completed: usize,
    pub timed_out: usize,
    /// Sum of completed partition durations. Timed-out partitions are excluded.
    pub total_elapsed: Duration,
    pub remaining: usize,
}

impl RunStatistics {
    pub fn new(partitions: usize) -> Self {
        Self {
            remaining: partitions,
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: &OptimizationOutcome) {
        self.remaining = self.remaining.saturating_sub(1);
        match outcome.status {
            OutcomeStatus::Completed => {
                self.completed += 1;
                self.total_elapsed += outcome.elapsed;
            }
            OutcomeStatus::TimedOut => self.timed_out += 1,
        }
    }

    pub fn processed(&self) -> usize {
        self.completed + self.timed_out
    }

    /// Average completed duration times the partitions left. `None` until something
    /// has completed.
    pub fn eta(&self) -> Option<Duration> {
        if self.completed == 0 {
            return None;
        }
        let average = self.total_elapsed.div_f64(self.completed as f64);
        Some(average.mul_f64(self.remaining as f64))
    }
}

/// `1h 02m 03s`, `4m 05s`, `6s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Partition;

    fn outcome(id: &str, secs: u64, status: OutcomeStatus) -> OptimizationOutcome {
        OptimizationOutcome {
            partition: Partition::new(id, id),
            elapsed: Duration::from_secs(secs),
            status,
        }
    }

    #[test]
    fn test_eta_undefined_before_first_completion() {
        let mut stats = RunStatistics::new(3);
        assert_eq!(stats.eta(), None);

        stats.record(&outcome("p1", 30, OutcomeStatus::TimedOut));
        assert_eq!(stats.eta(), None);
        assert_eq!(stats.remaining, 2);
    }

    #[test]
    fn test_eta_averages_completed_only() {
        let mut stats = RunStatistics::new(5);
        stats.record(&outcome("p1", 2, OutcomeStatus::Completed));
        assert_eq!(stats.eta(), Some(Duration::from_secs(8)));

        stats.record(&outcome("p2", 100, OutcomeStatus::TimedOut));
        assert_eq!(stats.eta(), Some(Duration::from_secs(6)));

        stats.record(&outcome("p3", 4, OutcomeStatus::Completed));
        assert_eq!(stats.total_elapsed, Duration::from_secs(6));
        assert_eq!(stats.eta(), Some(Duration::from_secs(6)));
        assert_eq!(stats.processed(), 3);
    }

    #[test]
    fn test_eta_zero_when_done() {
        let mut stats = RunStatistics::new(1);
        stats.record(&outcome("p1", 7, OutcomeStatus::Completed));
        assert_eq!(stats.eta(), Some(Duration::ZERO));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(6)), "6s");
        assert_eq!(format_duration(Duration::from_secs(245)), "4m 05s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h 02m 03s");
        assert_eq!(format_duration(Duration::from_millis(900)), "0s");
    }
}
