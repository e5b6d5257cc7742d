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

//! Sequential optimization driver.
//!
//! Partitions are optimized strictly one at a time: `OPTIMIZE` is issued for a
//! partition, then `system.merges` is polled until the partition's merge is gone or the
//! per-partition budget is spent. A timed-out partition is left merging on the server
//! and the driver moves on; it is never retried within the run.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;

use crate::client::{QueryClient, column_f64, column_str};
use crate::common::{OptimizerMetricsRecorder, Partition, TableRef};
use crate::config::OptimizerConfig;
use crate::error::{OptimizerError, Result};
use crate::sql;

pub mod state;
pub mod stats;

pub use state::{ActiveMerge, MergeObservation, PartitionState, transition};
pub use stats::{RunStatistics, format_duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Completed,
    TimedOut,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Completed => write!(f, "completed"),
            OutcomeStatus::TimedOut => write!(f, "timed out"),
        }
    }
}

/// How one partition's processing ended.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationOutcome {
    pub partition: Partition,
    /// Measured from the adoption check that precedes command issuance.
    pub elapsed: Duration,
    pub status: OutcomeStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub table: TableRef,
    /// One entry per processed partition, in processing order.
    pub outcomes: Vec<OptimizationOutcome>,
    /// The run was cancelled; the partition being waited on has no outcome.
    pub interrupted: bool,
}

impl RunReport {
    pub fn new(table: TableRef) -> Self {
        Self {
            table,
            outcomes: vec![],
            interrupted: false,
        }
    }

    /// An interrupted report with no outcomes.
    pub fn cancelled(table: TableRef) -> Self {
        Self {
            interrupted: true,
            ..Self::new(table)
        }
    }

    pub fn completed_count(&self) -> usize {
        self.count(OutcomeStatus::Completed)
    }

    pub fn timed_out_count(&self) -> usize {
        self.count(OutcomeStatus::TimedOut)
    }

    pub fn total_elapsed(&self) -> Duration {
        self.outcomes.iter().map(|o| o.elapsed).sum()
    }

    fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

pub struct OptimizationDriver {
    client: Arc<dyn QueryClient>,
    config: OptimizerConfig,
    cancel: CancellationToken,
    metrics: Option<OptimizerMetricsRecorder>,
}

impl OptimizationDriver {
    pub fn new(client: Arc<dyn QueryClient>, config: OptimizerConfig) -> Self {
        Self {
            client,
            config,
            cancel: CancellationToken::new(),
            metrics: None,
        }
    }

    /// Cancelling `token` abandons the current wait and stops the run.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_metrics_recorder(mut self, metrics: OptimizerMetricsRecorder) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Optimizes `partitions` in order and returns one outcome per partition.
    ///
    /// Query failures abort the run. Timeouts do not.
    pub async fn run(&self, table: &TableRef, partitions: Vec<Partition>) -> Result<RunReport> {
        let total = partitions.len();
        let mut stats = RunStatistics::new(total);
        let mut report = RunReport::new(table.clone());

        for partition in partitions {
            if self.cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }

            let Some(outcome) = self.optimize_partition(table, &partition).await? else {
                report.interrupted = true;
                break;
            };

            stats.record(&outcome);
            if let Some(metrics) = &self.metrics {
                metrics.record_outcome(&outcome);
            }

            if outcome.status == OutcomeStatus::Completed {
                tracing::info!(
                    "Partition {} optimized in {}",
                    partition,
                    format_duration(outcome.elapsed)
                );
            }
            match stats.eta() {
                Some(eta) if stats.remaining > 0 => tracing::info!(
                    "{}/{} partitions of {} processed, about {} remaining",
                    stats.processed(),
                    total,
                    table,
                    format_duration(eta)
                ),
                _ => tracing::info!(
                    "{}/{} partitions of {} processed",
                    stats.processed(),
                    total,
                    table
                ),
            }

            report.outcomes.push(outcome);
        }

        // A cancel that lands while the last outcome is recorded still counts.
        report.interrupted |= self.cancel.is_cancelled();
        if report.interrupted {
            tracing::warn!(
                "Optimization of {} interrupted after {} of {} partitions",
                table,
                report.outcomes.len(),
                total
            );
        }
        Ok(report)
    }

    /// Drives one partition to a terminal state. `None` means the run was cancelled.
    ///
    /// The budget starts before the adoption pre-check, so every query made for the
    /// partition counts against it.
    async fn optimize_partition(
        &self,
        table: &TableRef,
        partition: &Partition,
    ) -> Result<Option<OptimizationOutcome>> {
        let timeout = self.config.optimize_timeout;
        let started_at = Instant::now();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let precheck = if self.config.adopt_running_merges {
            self.observe_merge_until(table, partition, deadline.as_mut())
                .await?
        } else {
            MergeWait::Observed(None)
        };

        let statement = sql::optimize_partition(table, partition);
        let mut state = match precheck {
            MergeWait::Cancelled => {
                log_abandoned(partition);
                return Ok(None);
            }
            MergeWait::Expired => PartitionState::TimedOut,
            MergeWait::Observed(Some(merge)) => {
                tracing::info!(
                    "Partition {} is already merging ({:.1}% after {:.0}s), waiting for it",
                    partition,
                    merge.progress * 100.0,
                    merge.elapsed
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_adopted_merge();
                }
                PartitionState::Polling
            }
            MergeWait::Observed(None) => {
                tracing::info!("Optimizing partition {} of {}", partition, table);
                tracing::debug!("{}", statement.sql());
                PartitionState::CommandIssued
            }
        };

        // The invocation is lazy: nothing reaches the server unless it is polled.
        let mut command = self.client.execute(&statement);
        let mut command_pending = state == PartitionState::CommandIssued;
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !state.is_terminal() {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    log_abandoned(partition);
                    return Ok(None);
                }

                result = &mut command, if command_pending => {
                    command_pending = false;
                    match result {
                        Ok(_) => tracing::debug!(
                            "OPTIMIZE for partition {} returned after {:?}",
                            partition,
                            started_at.elapsed()
                        ),
                        Err(e) if e.is_timeout() => tracing::debug!(
                            "OPTIMIZE for partition {} is still running ({}), polling for merges",
                            partition,
                            e
                        ),
                        Err(source) => {
                            tracing::error!("OPTIMIZE for partition {} failed: {}", partition, source);
                            return Err(OptimizerError::Command {
                                partition: partition.clone(),
                                source,
                            });
                        }
                    }
                }

                _ = &mut deadline => {
                    state = PartitionState::TimedOut;
                }

                _ = ticker.tick() => {
                    state = match self
                        .observe_merge_until(table, partition, deadline.as_mut())
                        .await?
                    {
                        MergeWait::Cancelled => {
                            log_abandoned(partition);
                            return Ok(None);
                        }
                        MergeWait::Expired => PartitionState::TimedOut,
                        MergeWait::Observed(merge) => {
                            let observation = match merge {
                                Some(merge) => {
                                    tracing::debug!(
                                        "Partition {} merge at {:.1}% ({:.0}s on server)",
                                        partition,
                                        merge.progress * 100.0,
                                        merge.elapsed
                                    );
                                    MergeObservation::Active(merge)
                                }
                                None if command_pending => MergeObservation::Unconfirmed,
                                None => MergeObservation::Absent,
                            };
                            transition(started_at.elapsed(), &observation, timeout)
                        }
                    };
                }
            }
        }

        let elapsed = started_at.elapsed();
        let status = if state == PartitionState::Completed {
            OutcomeStatus::Completed
        } else {
            tracing::warn!(
                "Partition {} did not finish merging within {}, moving on and leaving the merge running",
                partition,
                format_duration(timeout)
            );
            OutcomeStatus::TimedOut
        };

        Ok(Some(OptimizationOutcome {
            partition: partition.clone(),
            elapsed,
            status,
        }))
    }

    /// One registry read that gives way to cancellation and to `deadline`.
    async fn observe_merge_until(
        &self,
        table: &TableRef,
        partition: &Partition,
        deadline: Pin<&mut Sleep>,
    ) -> Result<MergeWait> {
        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => Ok(MergeWait::Cancelled),
            _ = deadline => Ok(MergeWait::Expired),
            merge = self.observe_merge(table, partition) => merge.map(MergeWait::Observed),
        }
    }

    async fn observe_merge(
        &self,
        table: &TableRef,
        partition: &Partition,
    ) -> Result<Option<ActiveMerge>> {
        let poll_error = |source| OptimizerError::Poll {
            partition: partition.clone(),
            source,
        };

        let rows = self
            .client
            .execute(&sql::active_merges(table, partition))
            .await
            .map_err(poll_error)?;

        for row in &rows {
            if column_str(row, 0).map_err(poll_error)? != partition.id {
                continue;
            }
            return Ok(Some(ActiveMerge {
                progress: column_f64(row, 1).map_err(poll_error)?,
                elapsed: column_f64(row, 2).map_err(poll_error)?,
            }));
        }
        Ok(None)
    }
}

/// How a registry read raced against cancellation and the budget ended.
enum MergeWait {
    Observed(Option<ActiveMerge>),
    Cancelled,
    Expired,
}

fn log_abandoned(partition: &Partition) {
    tracing::warn!(
        "Stopped waiting on partition {}; any merge already started keeps running on the server",
        partition
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockCall;
    use crate::client::{MergeScript, MockQueryClient};
    use crate::error::QueryError;

    fn orders() -> TableRef {
        TableRef::new("shop", "orders")
    }

    fn partitions(ids: &[&str]) -> Vec<Partition> {
        ids.iter().map(|id| Partition::new(*id, *id)).collect()
    }

    fn config(timeout_secs: u64, interval_secs: u64) -> OptimizerConfig {
        OptimizerConfig::builder()
            .optimize_timeout(Duration::from_secs(timeout_secs))
            .poll_interval(Duration::from_secs(interval_secs))
            .build()
            .unwrap()
    }

    fn summary(report: &RunReport) -> Vec<(String, Duration, OutcomeStatus)> {
        report
            .outcomes
            .iter()
            .map(|o| (o.partition.id.clone(), o.elapsed, o.status))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_completion_and_timeout() {
        let client = Arc::new(
            MockQueryClient::new()
                .with_merge_script("p1", MergeScript::finishes_after(2))
                .with_merge_script("p2", MergeScript::never_finishes())
                .with_merge_script("p3", MergeScript::finishes_after(1)),
        );
        let driver = OptimizationDriver::new(client.clone(), config(5, 1));

        let report = driver
            .run(&orders(), partitions(&["p1", "p2", "p3"]))
            .await
            .unwrap();

        assert_eq!(
            summary(&report),
            vec![
                ("p1".to_owned(), Duration::from_secs(2), OutcomeStatus::Completed),
                ("p2".to_owned(), Duration::from_secs(5), OutcomeStatus::TimedOut),
                ("p3".to_owned(), Duration::from_secs(1), OutcomeStatus::Completed),
            ]
        );
        assert!(!report.interrupted);
        assert_eq!(report.completed_count(), 2);
        assert_eq!(report.timed_out_count(), 1);
        assert_eq!(client.optimized_partitions(), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_absent_on_first_poll_completes_immediately() {
        let client = Arc::new(MockQueryClient::new());
        let driver = OptimizationDriver::new(client.clone(), config(60, 5));

        let report = driver.run(&orders(), partitions(&["p1"])).await.unwrap();

        assert_eq!(report.outcomes.len(), 1);
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.status, OutcomeStatus::Completed);
        assert!(outcome.elapsed < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_elapsed_reaches_budget() {
        let client = Arc::new(
            MockQueryClient::new().with_merge_script("p1", MergeScript::never_finishes()),
        );
        let driver = OptimizationDriver::new(client.clone(), config(7, 2));

        let report = driver.run(&orders(), partitions(&["p1"])).await.unwrap();

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.status, OutcomeStatus::TimedOut);
        assert!(outcome.elapsed >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_partitions_issues_no_command() {
        let client = Arc::new(MockQueryClient::new());
        let driver = OptimizationDriver::new(client.clone(), config(5, 1));

        let report = driver.run(&orders(), vec![]).await.unwrap();

        assert!(report.outcomes.is_empty());
        assert!(client.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_never_overlap() {
        let client = Arc::new(
            MockQueryClient::new()
                .with_optimize_latency(Duration::from_secs(3))
                .with_merge_script("p1", MergeScript::finishes_after(5))
                .with_merge_script("p2", MergeScript::never_finishes())
                .with_merge_script("p3", MergeScript::finishes_after(1)),
        );
        let driver = OptimizationDriver::new(client.clone(), config(10, 1));

        let report = driver
            .run(&orders(), partitions(&["p1", "p2", "p3"]))
            .await
            .unwrap();
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(client.max_commands_in_flight(), 1);

        // Every call for partition N happens before OPTIMIZE for partition N+1.
        let calls = client.calls();
        let position = |call: &MockCall| calls.iter().position(|c| c == call).unwrap();
        let last_poll = |id: &str| {
            calls
                .iter()
                .rposition(|c| *c == MockCall::PollMerges(id.to_owned()))
                .unwrap()
        };
        assert!(last_poll("p1") < position(&MockCall::Optimize("p2".to_owned())));
        assert!(last_poll("p2") < position(&MockCall::Optimize("p3".to_owned())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_absence_while_command_in_flight_is_not_success() {
        // The merge never shows up in the registry, but OPTIMIZE blocks for 3s.
        let client = Arc::new(MockQueryClient::new().with_optimize_latency(Duration::from_secs(3)));
        let driver = OptimizationDriver::new(client.clone(), config(10, 1));

        let report = driver.run(&orders(), partitions(&["p1"])).await.unwrap();

        assert_eq!(
            summary(&report),
            vec![("p1".to_owned(), Duration::from_secs(3), OutcomeStatus::Completed)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_command_is_cut_off_by_budget() {
        let client = Arc::new(
            MockQueryClient::new()
                .with_optimize_latency(Duration::from_secs(3600))
                .with_merge_script("p1", MergeScript::finishes_after(1)),
        );
        let driver = OptimizationDriver::new(client.clone(), config(5, 1));

        let report = driver
            .run(&orders(), partitions(&["p1", "p2"]))
            .await
            .unwrap();

        assert_eq!(
            summary(&report),
            vec![
                ("p1".to_owned(), Duration::from_secs(5), OutcomeStatus::TimedOut),
                ("p2".to_owned(), Duration::from_secs(5), OutcomeStatus::TimedOut),
            ]
        );
        assert_eq!(client.max_commands_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_timeout_error_keeps_polling() {
        let client = Arc::new(
            MockQueryClient::new()
                .with_optimize_latency(Duration::from_secs(2))
                .with_optimize_error("p1", Some(159), "Timeout exceeded: elapsed 2 seconds")
                .with_merge_script("p1", MergeScript::finishes_after(4)),
        );
        let driver = OptimizationDriver::new(client.clone(), config(30, 1));

        let report = driver.run(&orders(), partitions(&["p1"])).await.unwrap();

        assert_eq!(
            summary(&report),
            vec![("p1".to_owned(), Duration::from_secs(4), OutcomeStatus::Completed)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_failure_aborts_run() {
        let client = Arc::new(
            MockQueryClient::new()
                .with_optimize_error("p1", Some(60), "Table shop.orders does not exist"),
        );
        let driver = OptimizationDriver::new(client.clone(), config(30, 1));

        let err = driver
            .run(&orders(), partitions(&["p1", "p2"]))
            .await
            .unwrap_err();

        match err {
            OptimizerError::Command { partition, source } => {
                assert_eq!(partition.id, "p1");
                assert!(matches!(source, QueryError::Server { code: Some(60), .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(client.optimized_partitions(), vec!["p1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_failure_aborts_run() {
        let client = Arc::new(
            MockQueryClient::new().with_poll_error("p2", Some(210), "Connection reset by peer"),
        );
        let driver = OptimizationDriver::new(client.clone(), config(30, 1));

        let err = driver
            .run(&orders(), partitions(&["p1", "p2", "p3"]))
            .await
            .unwrap_err();

        assert!(matches!(err, OptimizerError::Poll { ref partition, .. } if partition.id == "p2"));
        assert_eq!(client.optimized_partitions(), vec!["p1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_merge_is_adopted() {
        let client = Arc::new(
            MockQueryClient::new()
                .with_merge_script("p1", MergeScript::finishes_after(2).already_running()),
        );
        let driver = OptimizationDriver::new(client.clone(), config(30, 1));

        let report = driver.run(&orders(), partitions(&["p1", "p2"])).await.unwrap();

        assert_eq!(
            summary(&report),
            vec![
                ("p1".to_owned(), Duration::from_secs(1), OutcomeStatus::Completed),
                ("p2".to_owned(), Duration::ZERO, OutcomeStatus::Completed),
            ]
        );
        assert_eq!(client.optimized_partitions(), vec!["p2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_merge_ignored_when_adoption_disabled() {
        let client = Arc::new(
            MockQueryClient::new()
                .with_merge_script("p1", MergeScript::finishes_after(2).already_running()),
        );
        let config = OptimizerConfig::builder()
            .optimize_timeout(Duration::from_secs(30))
            .poll_interval(Duration::from_secs(1))
            .adopt_running_merges(false)
            .build()
            .unwrap();
        let driver = OptimizationDriver::new(client.clone(), config);

        let report = driver.run(&orders(), partitions(&["p1"])).await.unwrap();

        assert_eq!(client.optimized_partitions(), vec!["p1"]);
        assert_eq!(
            summary(&report),
            vec![("p1".to_owned(), Duration::from_secs(2), OutcomeStatus::Completed)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_run() {
        let client = Arc::new(
            MockQueryClient::new()
                .with_merge_script("p1", MergeScript::finishes_after(1))
                .with_merge_script("p2", MergeScript::never_finishes()),
        );
        let token = CancellationToken::new();
        let driver =
            OptimizationDriver::new(client.clone(), config(60, 1)).with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            token.cancel();
        });

        let report = driver
            .run(&orders(), partitions(&["p1", "p2", "p3"]))
            .await
            .unwrap();
        canceller.await.unwrap();

        assert!(report.interrupted);
        assert_eq!(
            summary(&report),
            vec![("p1".to_owned(), Duration::from_secs(1), OutcomeStatus::Completed)]
        );
        assert_eq!(client.optimized_partitions(), vec!["p1", "p2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_issues_nothing() {
        let client = Arc::new(MockQueryClient::new());
        let token = CancellationToken::new();
        token.cancel();
        let driver = OptimizationDriver::new(client.clone(), config(60, 1)).with_cancellation(token);

        let report = driver.run(&orders(), partitions(&["p1"])).await.unwrap();

        assert!(report.interrupted);
        assert!(report.outcomes.is_empty());
        assert!(client.calls().is_empty());
    }

    fn without_adoption(timeout_secs: u64, interval_secs: u64) -> OptimizerConfig {
        OptimizerConfig::builder()
            .optimize_timeout(Duration::from_secs(timeout_secs))
            .poll_interval(Duration::from_secs(interval_secs))
            .adopt_running_merges(false)
            .build()
            .unwrap()
    }

    fn cancel_after(token: CancellationToken, secs: u64) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            token.cancel();
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_merges_read_is_cut_off_by_budget() {
        let client = Arc::new(
            MockQueryClient::new()
                .with_merge_script("p1", MergeScript::never_finishes())
                .with_poll_latency(Duration::from_secs(60)),
        );
        let driver = OptimizationDriver::new(client.clone(), without_adoption(5, 1));

        let report = driver.run(&orders(), partitions(&["p1"])).await.unwrap();

        assert_eq!(
            summary(&report),
            vec![("p1".to_owned(), Duration::from_secs(5), OutcomeStatus::TimedOut)]
        );
        assert_eq!(client.optimized_partitions(), vec!["p1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_adoption_check_is_cut_off_by_budget() {
        let client = Arc::new(
            MockQueryClient::new()
                .with_merge_script("p1", MergeScript::never_finishes())
                .with_poll_latency(Duration::from_secs(60)),
        );
        let driver = OptimizationDriver::new(client.clone(), config(5, 1));

        let report = driver.run(&orders(), partitions(&["p1"])).await.unwrap();

        assert_eq!(
            summary(&report),
            vec![("p1".to_owned(), Duration::from_secs(5), OutcomeStatus::TimedOut)]
        );
        assert!(client.optimized_partitions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_slow_merges_read_interrupts_run() {
        let client = Arc::new(
            MockQueryClient::new()
                .with_merge_script("p1", MergeScript::never_finishes())
                .with_poll_latency(Duration::from_secs(60)),
        );
        let token = CancellationToken::new();
        let driver = OptimizationDriver::new(client.clone(), without_adoption(30, 1))
            .with_cancellation(token.clone());
        let canceller = cancel_after(token, 2);

        let started = Instant::now();
        let report = driver.run(&orders(), partitions(&["p1"])).await.unwrap();
        canceller.await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert!(report.interrupted);
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_adoption_check_issues_nothing() {
        let client = Arc::new(
            MockQueryClient::new()
                .with_merge_script("p1", MergeScript::never_finishes())
                .with_poll_latency(Duration::from_secs(60)),
        );
        let token = CancellationToken::new();
        let driver =
            OptimizationDriver::new(client.clone(), config(30, 1)).with_cancellation(token.clone());
        let canceller = cancel_after(token, 2);

        let started = Instant::now();
        let report = driver.run(&orders(), partitions(&["p1", "p2"])).await.unwrap();
        canceller.await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert!(report.interrupted);
        assert!(report.outcomes.is_empty());
        assert!(client.optimized_partitions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_without_remaining_partitions_is_reported() {
        let client = Arc::new(MockQueryClient::new());
        let token = CancellationToken::new();
        let driver =
            OptimizationDriver::new(client.clone(), config(30, 1)).with_cancellation(token.clone());

        let report = driver.run(&orders(), partitions(&["p1"])).await.unwrap();
        assert!(!report.interrupted);

        token.cancel();
        let report = driver.run(&orders(), Vec::new()).await.unwrap();
        assert!(report.interrupted);
        assert_eq!(client.optimized_partitions(), vec!["p1"]);
    }
}
