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

use std::process::ExitCode;

use clap::Parser;
use clickhouse_optimizer_core::CancellationToken;
use clickhouse_optimizer_service::config::Settings;
use clickhouse_optimizer_service::report::{self, EXIT_FAILURE};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> ExitCode {
    let settings = Settings::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level())),
        )
        .init();

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Operation cancelled, no further partitions will be optimized");
            signal_token.cancel();
        }
    });

    match clickhouse_optimizer_service::run(&settings, cancel).await {
        Ok(report) => {
            report::log_summary(&report);
            ExitCode::from(report::exit_code(&report))
        }
        Err(e) => {
            tracing::error!("Error: {}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
