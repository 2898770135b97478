//! Task state persistence port
//!
//! The coordinator never locks in-process. Every write is a
//! compare-and-swap on `TaskState::version`, so jobs running in separate
//! processes against the same backing store see each other's writes.

use async_trait::async_trait;
use onair_common::{Result, TaskState};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[async_trait]
pub trait TaskStateStore: Send + Sync {
    /// Stored state for a station, `None` before its first scrape
    async fn load(&self, station_id: &str) -> Result<Option<TaskState>>;

    /// Store `state` if the stored version still equals `expected_version`
    ///
    /// `expected_version` is `None` when the caller saw no stored state.
    /// Returns `false`, writing nothing, when another writer got there first.
    async fn compare_and_swap(&self, expected_version: Option<i64>, state: &TaskState)
        -> Result<bool>;
}

/// Process-local store for tests and single-process runs
#[derive(Default)]
pub struct InMemoryTaskStateStore {
    states: Mutex<HashMap<String, TaskState>>,
}

impl InMemoryTaskStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite stored state, bypassing the version check
    pub async fn put(&self, state: TaskState) {
        self.states
            .lock()
            .await
            .insert(state.station_id.clone(), state);
    }
}

#[async_trait]
impl TaskStateStore for InMemoryTaskStateStore {
    async fn load(&self, station_id: &str) -> Result<Option<TaskState>> {
        Ok(self.states.lock().await.get(station_id).cloned())
    }

    async fn compare_and_swap(
        &self,
        expected_version: Option<i64>,
        state: &TaskState,
    ) -> Result<bool> {
        let mut states = self.states.lock().await;
        let stored_version = states.get(&state.station_id).map(|s| s.version);
        if stored_version != expected_version {
            return Ok(false);
        }
        states.insert(state.station_id.clone(), state.clone());
        Ok(true)
    }
}
