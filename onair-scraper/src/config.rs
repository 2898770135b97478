//! Runtime settings for onair-scraper
//!
//! Read from the `[scraper]` table and the `[[stations]]` array of the same
//! TOML file that carries the bootstrap configuration. Every setting has a
//! built-in default so an empty file is a valid configuration.

use onair_common::{Error, FetchSource, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Scraper tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperSettings {
    /// Budget for JSON/XML/HTML document fetches
    pub document_timeout_secs: u64,
    /// Budget for reading the head of a live audio stream
    pub stream_timeout_secs: u64,
    /// Budget for RSS feed fetches
    pub rss_timeout_secs: u64,
    /// Budget for the content-type precheck (HEAD)
    pub precheck_timeout_secs: u64,
    /// Maximum bytes read from a live stream looking for an ID3 tag
    pub stream_read_limit_bytes: usize,
    /// Age after which a running task is presumed crashed
    pub stale_task_after_secs: i64,
    pub probe_timeout_secs: u64,
    /// Bytes requested by the uptime probe
    pub probe_read_bytes: usize,
    /// Re-raise strategy errors instead of recording them
    pub debug: bool,
    pub user_agent: String,
    pub cleaner: CleanerSettings,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            document_timeout_secs: 5,
            stream_timeout_secs: 60,
            rss_timeout_secs: 120,
            precheck_timeout_secs: 3,
            stream_read_limit_bytes: 64 * 1024,
            stale_task_after_secs: 300,
            probe_timeout_secs: 15,
            probe_read_bytes: 32 * 1024,
            debug: false,
            user_agent: format!("onair-scraper/{}", env!("CARGO_PKG_VERSION")),
            cleaner: CleanerSettings::default(),
        }
    }
}

impl ScraperSettings {
    pub fn document_timeout(&self) -> Duration {
        Duration::from_secs(self.document_timeout_secs)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    pub fn rss_timeout(&self) -> Duration {
        Duration::from_secs(self.rss_timeout_secs)
    }

    pub fn precheck_timeout(&self) -> Duration {
        Duration::from_secs(self.precheck_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn stale_task_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_task_after_secs)
    }
}

/// Character allow-list of the title cleaner
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleanerSettings {
    /// Letters kept in addition to ASCII letters and digits
    pub extra_letters: String,
}

impl Default for CleanerSettings {
    fn default() -> Self {
        Self {
            extra_letters: "ăâîșțşţĂÂÎȘȚŞŢ".to_string(),
        }
    }
}

/// One station from the catalogue
#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    pub id: String,
    /// Live stream probed by the uptime check
    #[serde(default)]
    pub stream_url: Option<String>,
    #[serde(default)]
    pub rss_url: Option<String>,
    #[serde(default)]
    pub sources: Vec<FetchSource>,
}

/// Service-level view of the TOML file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub scraper: ScraperSettings,
    #[serde(default)]
    pub stations: Vec<StationConfig>,
}

impl ServiceConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ServiceConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file, a missing file yields defaults and no stations
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
        Self::from_toml_str(&content)
    }

    pub fn station(&self, id: &str) -> Option<&StationConfig> {
        self.stations.iter().find(|s| s.id == id)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for station in &self.stations {
            if station.id.trim().is_empty() {
                return Err(Error::Config("station with empty id".to_string()));
            }
            if !seen.insert(station.id.as_str()) {
                return Err(Error::Config(format!("duplicate station id '{}'", station.id)));
            }
        }
        Ok(())
    }
}
