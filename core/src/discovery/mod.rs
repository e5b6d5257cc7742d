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

use crate::client::{QueryClient, column_str, column_u64};
use crate::common::{Partition, TableRef};
use crate::error::{OptimizerError, QueryError, Result};
use crate::sql;

/// Lists the partitions of `table` that still have more than one active part, in
/// `partition_id` order.
///
/// A missing or unpartitioned table yields an empty list. Query failures are fatal and
/// return no partial result.
pub async fn discover(client: &dyn QueryClient, table: &TableRef) -> Result<Vec<Partition>> {
    let rows = client
        .execute(&sql::partition_discovery(table))
        .await
        .map_err(|source| discovery_error(table, source))?;

    let mut partitions = Vec::with_capacity(rows.len());
    let mut optimized = vec![];
    for row in &rows {
        let decoded = column_str(row, 0).and_then(|id| {
            let name = column_str(row, 1)?;
            let parts = column_u64(row, 2)?;
            Ok((Partition::new(id, name), parts))
        });
        let (partition, parts) = decoded.map_err(|source| discovery_error(table, source))?;

        if parts <= 1 {
            optimized.push(partition.id);
        } else if !partitions.contains(&partition) {
            partitions.push(partition);
        }
    }

    if !optimized.is_empty() {
        tracing::debug!(
            "Excluding {} single-part partitions of {}: {}",
            optimized.len(),
            table,
            optimized.join(", ")
        );
    }

    Ok(partitions)
}

fn discovery_error(table: &TableRef, source: QueryError) -> OptimizerError {
    OptimizerError::Discovery {
        table: table.clone(),
        source,
    }
}
