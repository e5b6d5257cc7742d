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

//! End-to-end optimization of one table: discovery followed by the sequential driver.

use std::sync::Arc;

use mixtrics::metrics::BoxedRegistry;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::client::QueryClient;
use crate::common::{Metrics, OptimizerMetricsRecorder, TableRef};
use crate::config::OptimizerConfig;
use crate::discovery::discover;
use crate::driver::{OptimizationDriver, RunReport};

/// Builder for [`TableOptimizer`].
pub struct TableOptimizerBuilder {
    client: Arc<dyn QueryClient>,
    table: TableRef,

    config: Option<OptimizerConfig>,
    cancel: Option<CancellationToken>,
    registry: Option<BoxedRegistry>,
}

impl TableOptimizerBuilder {
    pub fn new(client: Arc<dyn QueryClient>, table: TableRef) -> Self {
        Self {
            client,
            table,

            config: None,
            cancel: None,
            registry: None,
        }
    }

    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_registry(mut self, registry: BoxedRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> TableOptimizer {
        let cancel = self.cancel.unwrap_or_default();
        let mut driver =
            OptimizationDriver::new(self.client.clone(), self.config.unwrap_or_default())
                .with_cancellation(cancel.clone());

        if let Some(registry) = self.registry {
            let metrics = Arc::new(Metrics::new(registry));
            driver = driver.with_metrics_recorder(OptimizerMetricsRecorder::new(
                metrics,
                self.table.to_string(),
            ));
        }

        TableOptimizer {
            client: self.client,
            table: self.table,
            driver,
            cancel,
        }
    }
}

pub struct TableOptimizer {
    client: Arc<dyn QueryClient>,
    table: TableRef,
    driver: OptimizationDriver,
    cancel: CancellationToken,
}

impl TableOptimizer {
    pub fn builder(client: Arc<dyn QueryClient>, table: TableRef) -> TableOptimizerBuilder {
        TableOptimizerBuilder::new(client, table)
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    /// Optimizes every partition that still has more than one active part.
    ///
    /// Returns an empty report when there is nothing to do, and an interrupted one when
    /// cancelled during discovery.
    pub async fn optimize(&self) -> Result<RunReport> {
        let discovered = tokio::select! {
            biased;

            _ = self.cancel.cancelled() => None,
            partitions = discover(self.client.as_ref(), &self.table) => Some(partitions),
        };
        let Some(partitions) = discovered else {
            tracing::warn!("Discovery of {} interrupted", self.table);
            return Ok(RunReport::cancelled(self.table.clone()));
        };
        let partitions = partitions?;
        if partitions.is_empty() {
            tracing::warn!("No active partitions found for table {}", self.table);
            return Ok(RunReport::new(self.table.clone()));
        }

        let config = self.driver.config();
        tracing::info!(
            "Optimizing {} partitions of {} (timeout {:?} per partition, polling every {:?})",
            partitions.len(),
            self.table,
            config.optimize_timeout,
            config.poll_interval
        );
        self.driver.run(&self.table, partitions).await
    }
}
