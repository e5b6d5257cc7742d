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

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use clickhouse_optimizer_core::client::HttpQueryClientConfig;
use clickhouse_optimizer_core::client::http::ConnectRetryConfig;
use clickhouse_optimizer_core::{OptimizerConfig, OptimizerError, TableRef};

const DEFAULT_HTTPS_PORT: u16 = 8443;
const DEFAULT_HTTP_PORT: u16 = 8123;

/// Optimize a ClickHouse table one partition at a time.
#[derive(Debug, Parser)]
#[command(name = "clickhouse-optimizer")]
#[command(version, about, long_about = None)]
pub struct Settings {
    /// ClickHouse server hostname.
    #[arg(long, env = "CLICKHOUSE_HOST")]
    pub host: String,

    /// HTTP interface port. Defaults to 8443 with --secure, 8123 otherwise.
    #[arg(long, env = "CLICKHOUSE_PORT")]
    pub port: Option<u16>,

    /// Database holding the table.
    #[arg(long, env = "CLICKHOUSE_DATABASE")]
    pub database: String,

    /// Username for authentication.
    #[arg(long, env = "CLICKHOUSE_USER")]
    pub user: String,

    /// Password for authentication.
    #[arg(long, env = "CLICKHOUSE_PASSWORD", hide_env_values = true)]
    pub password: Password,

    /// Use HTTPS.
    #[arg(long, env = "CLICKHOUSE_SECURE")]
    pub secure: bool,

    /// Enable debug logging.
    #[arg(short, long, env = "CLICKHOUSE_OPTIMIZER_VERBOSE")]
    pub verbose: bool,

    /// Maximum seconds to wait for one partition's merge.
    #[arg(long, env = "OPTIMIZE_TIMEOUT", default_value_t = 43_200, value_parser = clap::value_parser!(u64).range(1..))]
    pub optimize_timeout: u64,

    /// Seconds between merge status checks.
    #[arg(long, env = "POLL_INTERVAL", default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval: u64,

    /// Seconds before a single HTTP request gives up. A timed-out OPTIMIZE keeps
    /// running on the server and is tracked by polling.
    #[arg(long, env = "QUERY_TIMEOUT", default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    pub query_timeout: u64,

    /// Table to optimize.
    #[arg(value_name = "TABLE")]
    pub table: String,
}

/// Keeps the password out of `Debug` output.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

impl FromStr for Password {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl Settings {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(if self.secure {
            DEFAULT_HTTPS_PORT
        } else {
            DEFAULT_HTTP_PORT
        })
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef::new(self.database.as_str(), self.table.as_str())
    }

    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    pub fn client_config(&self) -> HttpQueryClientConfig {
        HttpQueryClientConfig {
            host: self.host.clone(),
            port: self.port(),
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.expose().to_owned(),
            secure: self.secure,
            query_timeout: Duration::from_secs(self.query_timeout),
            connect_retry: ConnectRetryConfig::default(),
        }
    }

    pub fn optimizer_config(&self) -> Result<OptimizerConfig, OptimizerError> {
        OptimizerConfig::builder()
            .optimize_timeout(Duration::from_secs(self.optimize_timeout))
            .poll_interval(Duration::from_secs(self.poll_interval))
            .build()
            .map_err(|e| OptimizerError::Config(e.to_string()))
    }
}
