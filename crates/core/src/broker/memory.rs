//! In-process message log for single-process deployments and tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::log::{BrokerError, LogRecord, MessageLog};

#[derive(Default)]
struct MemoryState {
    records: Vec<LogRecord>,
    last_offset: i64,
    offsets: HashMap<(String, String), i64>,
}

/// Message log kept in memory. Lost on restart.
#[derive(Default)]
pub struct MemoryMessageLog {
    state: Mutex<MemoryState>,
}

impl MemoryMessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, BrokerError> {
        self.state
            .lock()
            .map_err(|_| BrokerError::Storage("message log mutex poisoned".to_string()))
    }
}

impl MessageLog for MemoryMessageLog {
    fn append(&self, topic: &str, payload: &[u8]) -> Result<i64, BrokerError> {
        let mut state = self.state()?;
        state.last_offset += 1;
        let offset = state.last_offset;
        state.records.push(LogRecord {
            offset,
            topic: topic.to_string(),
            payload: payload.to_vec(),
            appended_at: Utc::now(),
        });
        Ok(offset)
    }

    fn read_after(
        &self,
        topic: &str,
        after: i64,
        limit: usize,
    ) -> Result<Vec<LogRecord>, BrokerError> {
        let state = self.state()?;
        let start = state.records.partition_point(|r| r.offset <= after);
        Ok(state.records[start..]
            .iter()
            .filter(|r| r.topic == topic)
            .take(limit)
            .cloned()
            .collect())
    }

    fn latest_offset(&self, topic: &str) -> Result<i64, BrokerError> {
        let state = self.state()?;
        Ok(state
            .records
            .iter()
            .rev()
            .find(|r| r.topic == topic)
            .map(|r| r.offset)
            .unwrap_or(0))
    }

    fn committed_offset(&self, group: &str, topic: &str) -> Result<i64, BrokerError> {
        let state = self.state()?;
        Ok(state
            .offsets
            .get(&(group.to_string(), topic.to_string()))
            .copied()
            .unwrap_or(0))
    }

    fn commit_offset(&self, group: &str, topic: &str, offset: i64) -> Result<(), BrokerError> {
        let mut state = self.state()?;
        let committed = state
            .offsets
            .entry((group.to_string(), topic.to_string()))
            .or_insert(0);
        *committed = (*committed).max(offset);
        Ok(())
    }

    fn drop_group(&self, group: &str, topic: &str) -> Result<(), BrokerError> {
        let mut state = self.state()?;
        state.offsets.remove(&(group.to_string(), topic.to_string()));
        Ok(())
    }

    fn prune_consumed(&self, cutoff: DateTime<Utc>) -> Result<usize, BrokerError> {
        let mut state = self.state()?;

        let mut floor: HashMap<String, i64> = HashMap::new();
        for ((_, topic), committed) in &state.offsets {
            let entry = floor.entry(topic.clone()).or_insert(*committed);
            *entry = (*entry).min(*committed);
        }
        let mut newest: HashMap<String, i64> = HashMap::new();
        for record in &state.records {
            newest.insert(record.topic.clone(), record.offset);
        }

        let before = state.records.len();
        state.records.retain(|r| {
            let consumed = floor.get(&r.topic).is_some_and(|f| r.offset <= *f);
            let is_newest = newest.get(&r.topic) == Some(&r.offset);
            !(r.appended_at < cutoff && consumed && !is_newest)
        });
        Ok(before - state.records.len())
    }
}
