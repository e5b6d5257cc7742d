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

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde::Deserialize;

use super::{QueryClient, Row, Statement};
use crate::error::QueryError;

const USER_AGENT: &str = "clickhouse-optimizer";
const EXCEPTION_CODE_HEADER: &str = "X-ClickHouse-Exception-Code";

#[derive(Debug, Clone)]
pub struct HttpQueryClientConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub secure: bool,
    /// Client-side limit for one HTTP round trip. An `OPTIMIZE` that outlives it keeps
    /// running on the server; the driver then falls back to polling.
    pub query_timeout: Duration,
    pub connect_retry: ConnectRetryConfig,
}

#[derive(Debug, Clone)]
pub struct ConnectRetryConfig {
    pub max_retries: usize,
    pub retry_initial_delay: Duration,
    pub retry_max_delay: Duration,
}

impl Default for ConnectRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_initial_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(10),
        }
    }
}

/// [`QueryClient`] over the ClickHouse HTTP interface.
pub struct HttpQueryClient {
    client: reqwest::Client,
    url: String,
    database: String,
    user: String,
    password: String,
    connect_retry: ConnectRetryConfig,
}

#[derive(Deserialize)]
struct JsonCompactResponse {
    data: Vec<Row>,
}

impl HttpQueryClient {
    pub fn new(config: HttpQueryClientConfig) -> Result<Self, QueryError> {
        let client = reqwest::Client::builder()
            .timeout(config.query_timeout)
            .user_agent(USER_AGENT)
            .build()?;
        let scheme = if config.secure { "https" } else { "http" };

        Ok(Self {
            client,
            url: format!("{}://{}:{}/", scheme, config.host, config.port),
            database: config.database,
            user: config.user,
            password: config.password,
            connect_retry: config.connect_retry,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Checks the server answers `SELECT 1`, retrying transport failures with
    /// exponential backoff.
    pub async fn ping(&self) -> Result<(), QueryError> {
        let operation = || async {
            self.execute(&Statement::query("SELECT 1"))
                .await
                .map(|_| ())
        };

        let retry_strategy = ExponentialBuilder::default()
            .with_min_delay(self.connect_retry.retry_initial_delay)
            .with_max_delay(self.connect_retry.retry_max_delay)
            .with_max_times(self.connect_retry.max_retries);

        operation
            .retry(&retry_strategy)
            .when(|e: &QueryError| matches!(e, QueryError::Transport(_)))
            .notify(|e: &QueryError, delay: Duration| {
                tracing::warn!("ClickHouse at {} not reachable ({}), retrying in {:?}", self.url, e, delay);
            })
            .await
    }

    fn query_pairs(&self, statement: &Statement) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("database".to_owned(), self.database.clone()),
            (
                "output_format_json_quote_64bit_integers".to_owned(),
                "0".to_owned(),
            ),
        ];
        pairs.extend(
            statement
                .params()
                .iter()
                .map(|(name, value)| (format!("param_{name}"), value.clone())),
        );
        pairs
    }
}

#[async_trait]
impl QueryClient for HttpQueryClient {
    async fn execute(&self, statement: &Statement) -> Result<Vec<Row>, QueryError> {
        let mut sql = statement.sql().to_owned();
        if statement.returns_rows() {
            sql.push_str(" FORMAT JSONCompact");
        }
        tracing::trace!("Executing: {}", sql);

        let response = self
            .client
            .post(&self.url)
            .query(&self.query_pairs(statement))
            .header("X-ClickHouse-User", &self.user)
            .header("X-ClickHouse-Key", &self.password)
            .body(sql)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let header_code = response
                .headers()
                .get(EXCEPTION_CODE_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::debug!("Failed to read body of HTTP {} response: {}", status, e);
                    String::new()
                }
            };
            let message = body.trim().to_owned();
            let code = header_code.or_else(|| parse_exception_code(&message));
            return Err(QueryError::Server {
                code,
                message: if message.is_empty() {
                    format!("HTTP {status}")
                } else {
                    message
                },
            });
        }

        if !statement.returns_rows() {
            return Ok(vec![]);
        }

        let body = response.bytes().await?;
        let parsed: JsonCompactResponse = serde_json::from_slice(&body)?;
        Ok(parsed.data)
    }
}

/// Extracts `N` from an exception body of the form `Code: N. DB::Exception: ...`.
fn parse_exception_code(body: &str) -> Option<u32> {
    let rest = &body[body.find("Code: ")? + "Code: ".len()..];
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}
