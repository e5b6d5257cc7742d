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

use std::borrow::Cow;
use std::sync::Arc;

use mixtrics::metrics::{BoxedCounterVec, BoxedHistogramVec, BoxedRegistry, Buckets};

use crate::driver::{OptimizationOutcome, OutcomeStatus};

pub struct Metrics {
    pub partition_completed_counter: BoxedCounterVec,
    pub partition_timed_out_counter: BoxedCounterVec,
    pub partition_adopted_merge_counter: BoxedCounterVec,
    pub partition_duration: BoxedHistogramVec,
}

impl Metrics {
    pub fn new(registry: BoxedRegistry) -> Self {
        let partition_completed_counter = registry.register_counter_vec(
            "clickhouse_optimizer_partition_completed_counter".into(),
            "Partitions whose merge finished within the timeout".into(),
            &["table"],
        );

        let partition_timed_out_counter = registry.register_counter_vec(
            "clickhouse_optimizer_partition_timed_out_counter".into(),
            "Partitions abandoned after the optimize timeout".into(),
            &["table"],
        );

        let partition_adopted_merge_counter = registry.register_counter_vec(
            "clickhouse_optimizer_partition_adopted_merge_counter".into(),
            "Partitions that already had a merge running and got no new OPTIMIZE".into(),
            &["table"],
        );

        // 1s 4s 16s ... ~73h
        let partition_duration = registry.register_histogram_vec_with_buckets(
            "clickhouse_optimizer_partition_duration".into(),
            "Wall-clock seconds spent per partition".into(),
            &["table"],
            Buckets::exponential(
                1.0, 4.0, 10, // Start at 1s, multiply each bucket by 4, up to 10 buckets
            ),
        );

        Self {
            partition_completed_counter,
            partition_timed_out_counter,
            partition_adopted_merge_counter,
            partition_duration,
        }
    }
}

/// Records per-partition metrics labelled with the table being optimized.
#[derive(Clone)]
pub struct OptimizerMetricsRecorder {
    metrics: Arc<Metrics>,
    table: String,
}

impl OptimizerMetricsRecorder {
    pub fn new(metrics: Arc<Metrics>, table: String) -> Self {
        Self { metrics, table }
    }

    fn label_vec(&self) -> [Cow<'static, str>; 1] {
        [self.table.clone().into()]
    }

    pub fn record_outcome(&self, outcome: &OptimizationOutcome) {
        let label_vec = self.label_vec();

        let counter = match outcome.status {
            OutcomeStatus::Completed => &self.metrics.partition_completed_counter,
            OutcomeStatus::TimedOut => &self.metrics.partition_timed_out_counter,
        };
        counter.counter(&label_vec).increase(1);

        self.metrics
            .partition_duration
            .histogram(&label_vec)
            .record(outcome.elapsed.as_secs_f64());
    }

    pub fn record_adopted_merge(&self) {
        let label_vec = self.label_vec();

        self.metrics
            .partition_adopted_merge_counter
            .counter(&label_vec)
            .increase(1);
    }
}
