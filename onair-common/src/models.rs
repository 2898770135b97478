//! Value types passed between the scrapers, the task state coordinator and
//! the persistence collaborators.
//!
//! All song fields are optional: `None` means "unknown", which the priority
//! merge treats differently from a known value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Separator used to split raw titles when a source does not configure one
pub const DEFAULT_SPLIT_CHARACTER: &str = " - ";

/// One configured upstream endpoint for a station
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSource {
    /// Strategy identifier (e.g. "shoutcast-json")
    pub category: String,
    pub url: String,
    /// Higher is more trusted
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub split_character: Option<String>,
    /// Removed from the raw title before splitting (first match only)
    #[serde(default)]
    pub station_name_regex: Option<String>,
    #[serde(default)]
    pub artist_regex: Option<String>,
    #[serde(default)]
    pub title_regex: Option<String>,
    /// Marks results from this source as auto-scraped, low-confidence
    #[serde(default)]
    pub dirty: bool,
}

impl FetchSource {
    pub fn new(category: impl Into<String>, url: impl Into<String>, priority: i32) -> Self {
        Self {
            category: category.into(),
            url: url.into(),
            priority,
            split_character: None,
            station_name_regex: None,
            artist_regex: None,
            title_regex: None,
            dirty: false,
        }
    }

    /// Stable key of this source inside a station's task state
    pub fn fetcher_id(&self) -> String {
        format!("{}@{}", self.category, self.url)
    }

    /// Configured split character, or `" - "`
    pub fn split_character(&self) -> &str {
        self.split_character
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SPLIT_CHARACTER)
    }
}

/// Song currently on air as reported by one or more sources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongData {
    pub name: Option<String>,
    pub artist: Option<String>,
    pub thumbnail_url: Option<String>,
    pub raw_title: Option<String>,
}

impl SongData {
    /// True when no field carries a value
    pub fn is_empty(&self) -> bool {
        is_blank(&self.name)
            && is_blank(&self.artist)
            && is_blank(&self.thumbnail_url)
            && is_blank(&self.raw_title)
    }

    /// Both song name and artist are known
    pub fn is_complete(&self) -> bool {
        !is_blank(&self.name) && !is_blank(&self.artist)
    }
}

/// True for `None` and for empty or whitespace-only strings
pub fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(|v| v.trim().is_empty()).unwrap_or(true)
}

/// Result of scraping one source, and of merging several
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationNowPlayingData {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub current_song: Option<SongData>,
    #[serde(default)]
    pub listeners: Option<i64>,
    /// Evidence trail, append-only
    #[serde(default)]
    pub raw_data: Vec<Value>,
    /// Error trail, append-only
    #[serde(default)]
    pub error: Vec<Value>,
    #[serde(default)]
    pub dirty: bool,
}

impl StationNowPlayingData {
    /// Result with no song and no listeners
    pub fn empty() -> Self {
        Self {
            timestamp: Utc::now(),
            current_song: None,
            listeners: None,
            raw_data: Vec::new(),
            error: Vec::new(),
            dirty: false,
        }
    }

    /// Empty result carrying a single error record
    pub fn failed(kind: &str, message: impl Into<String>) -> Self {
        let mut data = Self::empty();
        data.push_error(kind, message);
        data
    }

    pub fn push_raw(&mut self, value: Value) {
        self.raw_data.push(value);
    }

    pub fn push_error(&mut self, kind: &str, message: impl Into<String>) {
        self.error.push(json!({
            "type": kind,
            "message": message.into(),
            "timestamp": Utc::now().to_rfc3339(),
        }));
    }

    pub fn song_name(&self) -> Option<&str> {
        self.current_song.as_ref()?.name.as_deref()
    }

    pub fn song_artist(&self) -> Option<&str> {
        self.current_song.as_ref()?.artist.as_deref()
    }

    /// Name and artist both known, the early-exit condition
    pub fn has_complete_song(&self) -> bool {
        self.current_song
            .as_ref()
            .map(SongData::is_complete)
            .unwrap_or(false)
    }

    /// Neither song data nor listener count present
    pub fn is_empty(&self) -> bool {
        self.current_song
            .as_ref()
            .map(SongData::is_empty)
            .unwrap_or(true)
            && self.listeners.is_none()
    }
}

/// Live-stream availability measured by the uptime prober
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationUptimeData {
    pub timestamp: DateTime<Utc>,
    pub is_up: bool,
    pub latency_ms: i64,
    #[serde(default)]
    pub raw_data: Vec<Value>,
}

/// One post of a station's RSS feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RssPost {
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

/// What one fetcher produced during a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "payload")]
pub enum FetcherOutcome {
    Completed(StationNowPlayingData),
    Failed(String),
}

impl FetcherOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, FetcherOutcome::Completed(_))
    }
}

/// Latest recorded outcome of one fetcher for a station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetcherEntry {
    pub outcome: FetcherOutcome,
    pub priority: i32,
    pub timestamp: DateTime<Utc>,
    /// Task that wrote this entry
    pub task_id: Uuid,
    /// Source was flagged dirty
    #[serde(default)]
    pub dirty: bool,
}

/// Per-station ownership and fetcher bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    pub station_id: String,
    pub current_task_id: Option<Uuid>,
    pub current_task_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub processed_fetcher_states: BTreeMap<String, FetcherEntry>,
    pub last_successful_update_at: Option<DateTime<Utc>>,
    pub last_successful_task_id: Option<Uuid>,
    /// Optimistic concurrency counter, bumped on every write
    #[serde(default)]
    pub version: i64,
}

impl TaskState {
    pub fn new(station_id: impl Into<String>) -> Self {
        Self {
            station_id: station_id.into(),
            current_task_id: None,
            current_task_started_at: None,
            processed_fetcher_states: BTreeMap::new(),
            last_successful_update_at: None,
            last_successful_task_id: None,
            version: 0,
        }
    }

    pub fn is_owned_by(&self, task_id: Uuid) -> bool {
        self.current_task_id == Some(task_id)
    }

    /// Entries written at or after the current task started
    ///
    /// Older entries are leftovers from earlier runs. Without a running task
    /// nothing is current.
    pub fn current_entries(&self) -> impl Iterator<Item = (&String, &FetcherEntry)> {
        let started_at = self.current_task_started_at;
        self.processed_fetcher_states
            .iter()
            .filter(move |(_, entry)| match started_at {
                Some(start) => entry.timestamp >= start,
                None => false,
            })
    }
}
