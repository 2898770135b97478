//! SQLite persistence for onair-scraper
//!
//! One database file holds the per-station task state and the results
//! handed over by scrape, uptime and RSS jobs.

pub mod results;
pub mod task_state;

pub use results::SqliteResultSink;
pub use task_state::SqliteTaskStateStore;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Lock wait budget for writes, shared by every table
pub const MAX_LOCK_WAIT_MS: u64 = 5000;

/// Open (creating if needed) the database and its tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect(&db_url)
        .await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database, for tests and dry runs
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS station_task_state (
            station_id TEXT PRIMARY KEY,
            state_json TEXT NOT NULL,
            version INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS now_playing (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            station_id TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            song_name TEXT,
            song_artist TEXT,
            thumbnail_url TEXT,
            listeners INTEGER,
            dirty INTEGER NOT NULL DEFAULT 0,
            raw_data TEXT NOT NULL DEFAULT '[]',
            error TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS uptime (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            station_id TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            is_up INTEGER NOT NULL,
            latency_ms INTEGER NOT NULL,
            raw_data TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rss_posts (
            station_id TEXT NOT NULL,
            link TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            published_at TEXT,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (station_id, link)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (station_task_state, now_playing, uptime, rss_posts)");
    Ok(())
}
