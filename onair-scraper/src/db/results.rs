//! SQLite result sink

use crate::jobs::ResultSink;
use crate::utils::retry_on_lock;
use async_trait::async_trait;
use chrono::Utc;
use onair_common::{Error, Result, RssPost, StationNowPlayingData, StationUptimeData};
use sqlx::SqlitePool;

use super::MAX_LOCK_WAIT_MS;

pub struct SqliteResultSink {
    pool: SqlitePool,
}

impl SqliteResultSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ResultSink for SqliteResultSink {
    async fn save_now_playing(&self, station_id: &str, data: &StationNowPlayingData) -> Result<()> {
        let song = data.current_song.clone().unwrap_or_default();
        let recorded_at = data.timestamp.to_rfc3339();
        let raw_data = serde_json::to_string(&data.raw_data)?;
        let error = serde_json::to_string(&data.error)?;

        retry_on_lock("save_now_playing", MAX_LOCK_WAIT_MS, || async {
            sqlx::query(
                r#"
                INSERT INTO now_playing (
                    station_id, recorded_at, song_name, song_artist, thumbnail_url,
                    listeners, dirty, raw_data, error
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(station_id)
            .bind(&recorded_at)
            .bind(&song.name)
            .bind(&song.artist)
            .bind(&song.thumbnail_url)
            .bind(data.listeners)
            .bind(data.dirty)
            .bind(&raw_data)
            .bind(&error)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
            Ok(())
        })
        .await
    }

    async fn save_uptime(&self, station_id: &str, data: &StationUptimeData) -> Result<()> {
        let recorded_at = data.timestamp.to_rfc3339();
        let raw_data = serde_json::to_string(&data.raw_data)?;

        retry_on_lock("save_uptime", MAX_LOCK_WAIT_MS, || async {
            sqlx::query(
                "INSERT INTO uptime (station_id, recorded_at, is_up, latency_ms, raw_data) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(station_id)
            .bind(&recorded_at)
            .bind(data.is_up)
            .bind(data.latency_ms)
            .bind(&raw_data)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
            Ok(())
        })
        .await
    }

    async fn upsert_rss_posts(&self, station_id: &str, posts: &[RssPost]) -> Result<usize> {
        let updated_at = Utc::now().to_rfc3339();

        retry_on_lock("upsert_rss_posts", MAX_LOCK_WAIT_MS, || async {
            let mut tx = self.pool.begin().await.map_err(Error::Database)?;
            for post in posts {
                sqlx::query(
                    r#"
                    INSERT INTO rss_posts (station_id, link, title, description, published_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?)
                    ON CONFLICT(station_id, link) DO UPDATE SET
                        title = excluded.title,
                        description = excluded.description,
                        published_at = excluded.published_at,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(station_id)
                .bind(&post.link)
                .bind(&post.title)
                .bind(&post.description)
                .bind(post.published.map(|p| p.to_rfc3339()))
                .bind(&updated_at)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
            }
            tx.commit().await.map_err(Error::Database)?;
            Ok(posts.len())
        })
        .await
    }
}
