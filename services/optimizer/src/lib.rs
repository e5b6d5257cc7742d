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

pub mod config;
pub mod report;

use std::sync::Arc;

use clickhouse_optimizer_core::{
    CancellationToken, HttpQueryClient, OptimizerError, QueryError, RunReport, TableOptimizer,
};
use thiserror::Error;

use crate::config::Settings;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Cannot connect to ClickHouse at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: QueryError,
    },

    #[error(transparent)]
    Optimizer(#[from] OptimizerError),
}

/// Connects to ClickHouse and optimizes the configured table.
pub async fn run(settings: &Settings, cancel: CancellationToken) -> Result<RunReport, ServiceError> {
    let optimizer_config = settings.optimizer_config()?;
    let client_config = settings.client_config();
    let url = format!(
        "{}://{}:{}",
        if client_config.secure { "https" } else { "http" },
        client_config.host,
        client_config.port
    );

    let client = HttpQueryClient::new(client_config).map_err(|source| ServiceError::Connect {
        url: url.clone(),
        source,
    })?;
    let pinged = tokio::select! {
        biased;

        _ = cancel.cancelled() => None,
        result = client.ping() => Some(result),
    };
    match pinged {
        Some(result) => result.map_err(|source| ServiceError::Connect { url, source })?,
        None => {
            tracing::warn!("Interrupted while connecting to {}", url);
            return Ok(RunReport::cancelled(settings.table_ref()));
        }
    }
    tracing::debug!("Connected to ClickHouse at {}", client.url());

    let optimizer = TableOptimizer::builder(Arc::new(client), settings.table_ref())
        .with_config(optimizer_config)
        .with_cancellation(cancel)
        .build();

    Ok(optimizer.optimize().await?)
}
