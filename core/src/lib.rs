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

pub mod client;
pub mod common;
pub mod config;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod optimizer;
pub mod sql;

pub use client::{HttpQueryClient, QueryClient};
pub use common::{Partition, TableRef};
pub use config::OptimizerConfig;
pub use driver::{OptimizationDriver, OptimizationOutcome, OutcomeStatus, RunReport};
pub use error::{OptimizerError, QueryError, Result};
pub use optimizer::{TableOptimizer, TableOptimizerBuilder};

// Re-export so callers can cancel a run without depending on tokio-util directly
pub use tokio_util::sync::CancellationToken;
