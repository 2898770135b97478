//! Per-station task state coordination
//!
//! A station is `Idle` (no current task) or `Running(task_id)`. Ownership
//! is advisory and time-windowed: a running task older than the stale
//! window is presumed crashed and may be taken over. Two jobs racing
//! through `initialize` inside the same window can both win; the loser
//! notices at its next `record_result` or `finalize`.
//!
//! Every mutation is read-modify-write against the store with a version
//! check, retried a bounded number of times.

pub mod merge;
pub mod store;

pub use merge::merge;
pub use store::{InMemoryTaskStateStore, TaskStateStore};

use crate::error::{ScrapeError, ScrapeResult};
use onair_common::{time, FetcherEntry, FetcherOutcome, StationNowPlayingData, TaskState};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Write attempts before giving up on a contended station
const MAX_SWAP_ATTEMPTS: usize = 5;

/// Result of `initialize`
#[derive(Debug, Clone)]
pub struct InitOutcome {
    /// False when another live task owns the station
    pub should_continue: bool,
    pub state: TaskState,
}

/// Result of `record_result`
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    /// True when this task no longer owns the station; nothing was written
    pub should_abort: bool,
    /// Live merge after the write
    pub merged: Option<StationNowPlayingData>,
}

enum Mutation<T> {
    Write(T),
    Skip(T),
}

pub struct TaskStateCoordinator {
    store: Arc<dyn TaskStateStore>,
    stale_after: chrono::Duration,
}

impl TaskStateCoordinator {
    pub fn new(store: Arc<dyn TaskStateStore>, stale_after: chrono::Duration) -> Self {
        Self { store, stale_after }
    }

    /// Claim the station for `task_id`
    ///
    /// Succeeds when the station is idle, already owned by `task_id`, or
    /// owned by a task that started at least the stale window ago.
    pub async fn initialize(&self, station_id: &str, task_id: Uuid) -> ScrapeResult<InitOutcome> {
        let stale_after = self.stale_after;
        let (state, should_continue) = self
            .mutate(station_id, |state| {
                let now = time::now();
                match (state.current_task_id, state.current_task_started_at) {
                    (Some(owner), _) if owner == task_id => return Mutation::Skip(true),
                    (Some(owner), Some(started))
                        if !time::is_older_than(started, stale_after, now) =>
                    {
                        debug!(
                            station_id = %state.station_id,
                            owner = %owner,
                            task_id = %task_id,
                            "Station owned by a live task"
                        );
                        return Mutation::Skip(false);
                    }
                    (Some(owner), started) => {
                        warn!(
                            station_id = %state.station_id,
                            stale_task_id = %owner,
                            started_at = ?started,
                            task_id = %task_id,
                            "Taking over stale task"
                        );
                    }
                    (None, _) => {}
                }
                state.current_task_id = Some(task_id);
                state.current_task_started_at = Some(now);
                Mutation::Write(true)
            })
            .await?;

        if should_continue {
            info!(station_id, task_id = %task_id, "Task started");
        }
        Ok(InitOutcome {
            should_continue,
            state,
        })
    }

    /// Record one fetcher's outcome and return the live merge
    pub async fn record_result(
        &self,
        station_id: &str,
        fetcher_id: &str,
        priority: i32,
        outcome: FetcherOutcome,
        task_id: Uuid,
        dirty: bool,
    ) -> ScrapeResult<RecordOutcome> {
        let (state, owned) = self
            .mutate(station_id, |state| {
                if !state.is_owned_by(task_id) {
                    return Mutation::Skip(false);
                }
                state.processed_fetcher_states.insert(
                    fetcher_id.to_string(),
                    FetcherEntry {
                        outcome: outcome.clone(),
                        priority,
                        timestamp: time::now(),
                        task_id,
                        dirty,
                    },
                );
                Mutation::Write(true)
            })
            .await?;

        if !owned {
            info!(station_id, task_id = %task_id, fetcher_id, "Task superseded, result discarded");
            return Ok(RecordOutcome {
                should_abort: true,
                merged: None,
            });
        }

        Ok(RecordOutcome {
            should_abort: false,
            merged: merge(&state),
        })
    }

    /// Release the station; a no-op when `task_id` was superseded
    ///
    /// Returns whether this task still owned the station.
    pub async fn finalize(&self, station_id: &str, task_id: Uuid, success: bool) -> ScrapeResult<bool> {
        let (_, owned) = self
            .mutate(station_id, |state| {
                if !state.is_owned_by(task_id) {
                    return Mutation::Skip(false);
                }
                state.current_task_id = None;
                state.current_task_started_at = None;
                if success {
                    state.last_successful_update_at = Some(time::now());
                    state.last_successful_task_id = Some(task_id);
                }
                Mutation::Write(true)
            })
            .await?;

        if owned {
            info!(station_id, task_id = %task_id, success, "Task finalized");
        } else {
            debug!(station_id, task_id = %task_id, "Finalize skipped, task superseded");
        }
        Ok(owned)
    }

    /// Current stored state
    pub async fn load(&self, station_id: &str) -> ScrapeResult<Option<TaskState>> {
        Ok(self.store.load(station_id).await?)
    }

    /// Read, apply, compare-and-swap; retried on version conflicts
    async fn mutate<T>(
        &self,
        station_id: &str,
        mut apply: impl FnMut(&mut TaskState) -> Mutation<T>,
    ) -> ScrapeResult<(TaskState, T)> {
        for attempt in 1..=MAX_SWAP_ATTEMPTS {
            let loaded = self.store.load(station_id).await?;
            let expected_version = loaded.as_ref().map(|s| s.version);
            let mut state = loaded.unwrap_or_else(|| TaskState::new(station_id));

            match apply(&mut state) {
                Mutation::Skip(value) => return Ok((state, value)),
                Mutation::Write(value) => {
                    state.version = expected_version.map_or(1, |v| v + 1);
                    if self.store.compare_and_swap(expected_version, &state).await? {
                        return Ok((state, value));
                    }
                    debug!(station_id, attempt, "Task state changed underneath, retrying");
                }
            }
        }

        warn!(station_id, attempts = MAX_SWAP_ATTEMPTS, "Task state write kept conflicting");
        Err(ScrapeError::ConcurrencyConflict {
            station_id: station_id.to_string(),
        })
    }
}
