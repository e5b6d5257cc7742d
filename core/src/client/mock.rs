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

//! Scripted in-memory [`QueryClient`].
//!
//! Partitions come from [`MockQueryClient::with_partition`]. A partition's merge shows
//! up in `system.merges` once `OPTIMIZE` is issued for it (or from the start, for
//! [`MergeScript::already_running`]) and disappears after the scripted number of polls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{QueryClient, Row, Statement};
use crate::common::Partition;
use crate::error::QueryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    DiscoverPartitions,
    Optimize(String),
    PollMerges(String),
    Other(String),
}

#[derive(Debug, Clone, Default)]
pub struct MergeScript {
    running_before_optimize: bool,
    /// `None` keeps the merge active forever.
    active_polls: Option<u32>,
    started: bool,
    polls_seen: u32,
}

impl MergeScript {
    /// Reported active for `polls` polls after it starts, then gone.
    pub fn finishes_after(polls: u32) -> Self {
        Self {
            active_polls: Some(polls),
            ..Default::default()
        }
    }

    pub fn never_finishes() -> Self {
        Self {
            active_polls: None,
            ..Default::default()
        }
    }

    /// The merge is visible before any `OPTIMIZE` is issued.
    pub fn already_running(mut self) -> Self {
        self.running_before_optimize = true;
        self.started = true;
        self
    }

    fn poll(&mut self) -> Option<(f64, f64)> {
        if !self.started {
            return None;
        }
        match self.active_polls {
            Some(limit) if self.polls_seen >= limit => None,
            limit => {
                self.polls_seen += 1;
                let progress = limit.map_or(0.5, |l| f64::from(self.polls_seen) / f64::from(l + 1));
                let elapsed = if self.running_before_optimize { 120.0 } else { 0.0 };
                Some((progress, elapsed))
            }
        }
    }
}

#[derive(Debug, Clone)]
struct ScriptedError {
    code: Option<u32>,
    message: String,
}

impl ScriptedError {
    fn to_error(&self) -> QueryError {
        QueryError::Server {
            code: self.code,
            message: self.message.clone(),
        }
    }
}

#[derive(Default)]
struct MockState {
    partitions: Vec<(Partition, u64)>,
    merges: HashMap<String, MergeScript>,
    discovery_error: Option<ScriptedError>,
    optimize_errors: HashMap<String, ScriptedError>,
    poll_errors: HashMap<String, ScriptedError>,
    calls: Vec<MockCall>,
}

#[derive(Default)]
pub struct MockQueryClient {
    state: Mutex<MockState>,
    optimize_latency: Option<Duration>,
    poll_latency: Option<Duration>,
    discovery_latency: Option<Duration>,
    commands_in_flight: Arc<AtomicUsize>,
    max_commands_in_flight: Arc<AtomicUsize>,
}

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockQueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a partition with `parts` active parts. Partitions with a single part are
    /// already optimized.
    pub fn with_partition(self, id: &str, parts: u64) -> Self {
        self.lock()
            .partitions
            .push((Partition::new(id, id), parts));
        self
    }

    pub fn with_merge_script(self, partition_id: &str, script: MergeScript) -> Self {
        self.lock().merges.insert(partition_id.to_owned(), script);
        self
    }

    pub fn with_discovery_error(self, code: Option<u32>, message: &str) -> Self {
        self.lock().discovery_error = Some(ScriptedError {
            code,
            message: message.to_owned(),
        });
        self
    }

    pub fn with_optimize_error(self, partition_id: &str, code: Option<u32>, message: &str) -> Self {
        self.lock().optimize_errors.insert(
            partition_id.to_owned(),
            ScriptedError {
                code,
                message: message.to_owned(),
            },
        );
        self
    }

    pub fn with_poll_error(self, partition_id: &str, code: Option<u32>, message: &str) -> Self {
        self.lock().poll_errors.insert(
            partition_id.to_owned(),
            ScriptedError {
                code,
                message: message.to_owned(),
            },
        );
        self
    }

    /// Every `OPTIMIZE` blocks for `latency` before it returns.
    pub fn with_optimize_latency(mut self, latency: Duration) -> Self {
        self.optimize_latency = Some(latency);
        self
    }

    /// Every `system.merges` read takes `latency` to answer.
    pub fn with_poll_latency(mut self, latency: Duration) -> Self {
        self.poll_latency = Some(latency);
        self
    }

    pub fn with_discovery_latency(mut self, latency: Duration) -> Self {
        self.discovery_latency = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn optimized_partitions(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::Optimize(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn max_commands_in_flight(&self) -> usize {
        self.max_commands_in_flight.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn discover(&self) -> Result<Vec<Row>, QueryError> {
        let mut state = self.lock();
        state.calls.push(MockCall::DiscoverPartitions);
        if let Some(e) = &state.discovery_error {
            return Err(e.to_error());
        }
        Ok(state
            .partitions
            .iter()
            .map(|(p, parts)| vec![json!(p.id), json!(p.name), json!(parts)])
            .collect())
    }

    fn poll_merges(&self, partition_id: &str) -> Result<Vec<Row>, QueryError> {
        let mut state = self.lock();
        state
            .calls
            .push(MockCall::PollMerges(partition_id.to_owned()));
        if let Some(e) = state.poll_errors.get(partition_id) {
            return Err(e.to_error());
        }
        let row = state
            .merges
            .get_mut(partition_id)
            .and_then(MergeScript::poll)
            .map(|(progress, elapsed)| vec![json!(partition_id), json!(progress), json!(elapsed)]);
        Ok(row.into_iter().collect())
    }

    async fn optimize(&self, partition_id: String) -> Result<Vec<Row>, QueryError> {
        let error = {
            let mut state = self.lock();
            state.calls.push(MockCall::Optimize(partition_id.clone()));
            if let Some(script) = state.merges.get_mut(&partition_id) {
                script.started = true;
            }
            state.optimize_errors.get(&partition_id).cloned()
        };

        let in_flight = self.commands_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_commands_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);
        let _guard = InFlightGuard(self.commands_in_flight.clone());

        delay(self.optimize_latency).await;

        match error {
            Some(e) => Err(e.to_error()),
            None => Ok(vec![]),
        }
    }
}

async fn delay(latency: Option<Duration>) {
    if let Some(latency) = latency {
        tokio::time::sleep(latency).await;
    }
}

fn optimized_partition_id(sql: &str) -> String {
    let literal = sql
        .split("PARTITION ID ")
        .nth(1)
        .unwrap_or_default()
        .trim_end_matches(" FINAL");
    literal.trim_matches('\'').to_owned()
}

#[async_trait]
impl QueryClient for MockQueryClient {
    async fn execute(&self, statement: &Statement) -> Result<Vec<Row>, QueryError> {
        let sql = statement.sql();
        if sql.starts_with("OPTIMIZE") {
            self.optimize(optimized_partition_id(sql)).await
        } else if sql.contains("system.parts") {
            delay(self.discovery_latency).await;
            self.discover()
        } else if sql.contains("system.merges") {
            let partition_id = statement.param("partition_id").unwrap_or_default();
            delay(self.poll_latency).await;
            self.poll_merges(partition_id)
        } else {
            self.lock().calls.push(MockCall::Other(sql.to_owned()));
            Ok(vec![vec![json!(1)]])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_script_starts_on_optimize() {
        let mut script = MergeScript::finishes_after(2);
        assert_eq!(script.poll(), None);
        script.started = true;
        assert!(script.poll().is_some());
        assert!(script.poll().is_some());
        assert_eq!(script.poll(), None);
        assert_eq!(script.poll(), None);
    }

    #[test]
    fn test_already_running_merge_is_visible() {
        let mut script = MergeScript::never_finishes().already_running();
        assert_eq!(script.poll(), Some((0.5, 120.0)));
    }

    #[test]
    fn test_optimized_partition_id() {
        assert_eq!(
            optimized_partition_id("OPTIMIZE TABLE `a`.`b` PARTITION ID '202401' FINAL"),
            "202401"
        );
    }
}
