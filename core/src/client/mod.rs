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

//! Query execution against the storage engine.
//!
//! [`QueryClient`] is the only seam between the optimizer and ClickHouse. The driver
//! issues the long-running `OPTIMIZE` and the `system.merges` polls through the same
//! client concurrently, so implementations take `&self` and must be `Sync`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::QueryError;

pub mod http;
pub mod mock;

pub use http::{HttpQueryClient, HttpQueryClientConfig};
pub use mock::{MergeScript, MockQueryClient};

/// One result row, columns in `SELECT` order.
pub type Row = Vec<Value>;

#[async_trait]
pub trait QueryClient: Send + Sync + 'static {
    /// Runs one statement and returns its rows. Statements that produce no result set
    /// return an empty vector.
    async fn execute(&self, statement: &Statement) -> Result<Vec<Row>, QueryError>;
}

/// SQL text plus the query parameters bound into its `{name:Type}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    sql: String,
    params: BTreeMap<String, String>,
    returns_rows: bool,
}

impl Statement {
    /// A statement producing a result set.
    pub fn query(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: BTreeMap::new(),
            returns_rows: true,
        }
    }

    /// A statement executed for its side effect.
    pub fn command(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: BTreeMap::new(),
            returns_rows: false,
        }
    }

    pub fn bind(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn returns_rows(&self) -> bool {
        self.returns_rows
    }
}

fn column<'a>(row: &'a Row, index: usize) -> Result<&'a Value, QueryError> {
    row.get(index).ok_or_else(|| {
        QueryError::Decode(format!(
            "row has {} columns, expected at least {}",
            row.len(),
            index + 1
        ))
    })
}

pub fn column_str(row: &Row, index: usize) -> Result<String, QueryError> {
    match column(row, index)? {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}

// JSON output quotes 64-bit integers by default, so numbers may arrive as strings.
pub fn column_u64(row: &Row, index: usize) -> Result<u64, QueryError> {
    let value = column(row, index)?;
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        QueryError::Decode(format!("column {index} is not an unsigned integer: {value}"))
    })
}

pub fn column_f64(row: &Row, index: usize) -> Result<f64, QueryError> {
    let value = column(row, index)?;
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| QueryError::Decode(format!("column {index} is not a number: {value}")))
}
