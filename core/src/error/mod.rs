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

use thiserror::Error;

use crate::common::{Partition, TableRef};

/// ClickHouse error codes that mean "the statement outlived a timeout", not "the statement
/// is broken". `TIMEOUT_EXCEEDED` and `SOCKET_TIMEOUT`.
const TIMEOUT_ERROR_CODES: [u32; 2] = [159, 209];

/// Failure of a single statement sent through a [`crate::client::QueryClient`].
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("ClickHouse exception (code {}): {message}", code_label(.code))]
    Server { code: Option<u32>, message: String },

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl QueryError {
    /// Whether the statement may still be running on the server.
    pub fn is_timeout(&self) -> bool {
        match self {
            QueryError::Transport(e) => e.is_timeout(),
            QueryError::Server { code, .. } => {
                code.is_some_and(|code| TIMEOUT_ERROR_CODES.contains(&code))
            }
            QueryError::Decode(_) => false,
        }
    }
}

fn code_label(code: &Option<u32>) -> String {
    code.map_or_else(|| "unknown".to_owned(), |c| c.to_string())
}

impl From<serde_json::Error> for QueryError {
    fn from(e: serde_json::Error) -> Self {
        QueryError::Decode(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Partition discovery failed for {table}: {source}")]
    Discovery {
        table: TableRef,
        #[source]
        source: QueryError,
    },

    #[error("OPTIMIZE for partition {partition} failed: {source}")]
    Command {
        partition: Partition,
        #[source]
        source: QueryError,
    },

    #[error("Polling merges for partition {partition} failed: {source}")]
    Poll {
        partition: Partition,
        #[source]
        source: QueryError,
    },
}

pub type Result<T> = std::result::Result<T, OptimizerError>;
