//! SQLite-backed task state
//!
//! The version column is the compare-and-swap token: an update only lands
//! when the stored version still matches what the writer read.

use crate::coordinator::TaskStateStore;
use crate::utils::retry_on_lock;
use async_trait::async_trait;
use chrono::Utc;
use onair_common::{Error, Result, TaskState};
use sqlx::{Row, SqlitePool};

use super::MAX_LOCK_WAIT_MS;

pub struct SqliteTaskStateStore {
    pool: SqlitePool,
}

impl SqliteTaskStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStateStore for SqliteTaskStateStore {
    async fn load(&self, station_id: &str) -> Result<Option<TaskState>> {
        let row = sqlx::query(
            "SELECT state_json, version FROM station_task_state WHERE station_id = ?",
        )
        .bind(station_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let state_json: String = row.get("state_json");
                let mut state: TaskState = serde_json::from_str(&state_json)?;
                state.version = row.get("version");
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn compare_and_swap(
        &self,
        expected_version: Option<i64>,
        state: &TaskState,
    ) -> Result<bool> {
        // Prepare everything before touching the pool
        let state_json = serde_json::to_string(state)?;
        let station_id = state.station_id.clone();
        let version = state.version;
        let updated_at = Utc::now().to_rfc3339();

        let rows_affected = retry_on_lock("task_state_swap", MAX_LOCK_WAIT_MS, || async {
            let result = match expected_version {
                None => {
                    sqlx::query(
                        r#"
                        INSERT INTO station_task_state (station_id, state_json, version, updated_at)
                        VALUES (?, ?, ?, ?)
                        ON CONFLICT(station_id) DO NOTHING
                        "#,
                    )
                    .bind(&station_id)
                    .bind(&state_json)
                    .bind(version)
                    .bind(&updated_at)
                    .execute(&self.pool)
                    .await
                }
                Some(expected) => {
                    sqlx::query(
                        r#"
                        UPDATE station_task_state
                        SET state_json = ?, version = ?, updated_at = ?
                        WHERE station_id = ? AND version = ?
                        "#,
                    )
                    .bind(&state_json)
                    .bind(version)
                    .bind(&updated_at)
                    .bind(&station_id)
                    .bind(expected)
                    .execute(&self.pool)
                    .await
                }
            };
            result.map(|r| r.rows_affected()).map_err(Error::Database)
        })
        .await?;

        Ok(rows_affected == 1)
    }
}
