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

use derive_builder::Builder;

pub const DEFAULT_OPTIMIZE_TIMEOUT: Duration = Duration::from_secs(43_200);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Knobs of the sequential optimization driver.
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct OptimizerConfig {
    /// Wall-clock budget per partition, measured from command issuance.
    #[builder(default = "DEFAULT_OPTIMIZE_TIMEOUT")]
    pub optimize_timeout: Duration,

    /// Delay between two reads of `system.merges`.
    #[builder(default = "DEFAULT_POLL_INTERVAL")]
    pub poll_interval: Duration,

    /// Wait on a merge that is already running for a partition instead of issuing
    /// another `OPTIMIZE` for it.
    #[builder(default = "true")]
    pub adopt_running_merges: bool,
}

impl OptimizerConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.optimize_timeout.is_some_and(|t| t.is_zero()) {
            return Err("optimize_timeout must be greater than zero".to_owned());
        }
        if self.poll_interval.is_some_and(|i| i.is_zero()) {
            return Err("poll_interval must be greater than zero".to_owned());
        }
        Ok(())
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            optimize_timeout: DEFAULT_OPTIMIZE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            adopt_running_merges: true,
        }
    }
}

impl OptimizerConfig {
    pub fn builder() -> OptimizerConfigBuilder {
        OptimizerConfigBuilder::default()
    }
}
