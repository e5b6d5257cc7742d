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

//! Builders for the statements the optimizer sends to ClickHouse.
//!
//! Names that can be bound as query parameters are bound; the `OPTIMIZE` statement does
//! not accept parameters, so identifiers and the partition id are quoted instead.

use crate::client::Statement;
use crate::common::{Partition, TableRef};

const SYSTEM_PARTS_TABLE: &str = "system.parts";
const SYSTEM_MERGES_TABLE: &str = "system.merges";

/// Active partitions of a table with their active part count.
///
/// Columns: `partition_id`, `partition`, `parts`.
pub fn partition_discovery(table: &TableRef) -> Statement {
    Statement::query(format!(
        "SELECT partition_id, any(partition) AS partition, count() AS parts \
         FROM {} \
         WHERE active = 1 AND database = {{database:String}} AND table = {{table:String}} \
         GROUP BY partition_id \
         ORDER BY partition_id",
        SYSTEM_PARTS_TABLE
    ))
    .bind("database", table.database.as_str())
    .bind("table", table.table.as_str())
}

/// In-flight merges of one partition.
///
/// Columns: `partition_id`, `progress`, `elapsed`.
pub fn active_merges(table: &TableRef, partition: &Partition) -> Statement {
    Statement::query(format!(
        "SELECT partition_id, progress, elapsed \
         FROM {} \
         WHERE database = {{database:String}} AND table = {{table:String}} \
         AND partition_id = {{partition_id:String}}",
        SYSTEM_MERGES_TABLE
    ))
    .bind("database", table.database.as_str())
    .bind("table", table.table.as_str())
    .bind("partition_id", partition.id.as_str())
}

pub fn optimize_partition(table: &TableRef, partition: &Partition) -> Statement {
    Statement::command(format!(
        "OPTIMIZE TABLE {}.{} PARTITION ID {} FINAL",
        quote_identifier(&table.database),
        quote_identifier(&table.table),
        quote_string(&partition.id)
    ))
}

pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
}

pub fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
