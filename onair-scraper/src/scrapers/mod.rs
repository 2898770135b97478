//! Scraper strategies - one per upstream source format
//!
//! A strategy turns already-fetched content into a normalized
//! `StationNowPlayingData`. Strategies never touch the network: the
//! orchestrator fetches according to the strategy's `FetchPlan` and hands
//! the bytes over.
//!
//! # Strategies
//! 1. **shoutcast** - Shoutcast v2 JSON stats and v1/v2 XML stats
//! 2. **icecast** - Icecast `status-json.xsl`
//! 3. **radio_co** - Radio.co status API
//! 4. **legacy_html** - Icecast/Shoutcast HTML status pages
//! 5. **vendor** - station-specific JSON APIs described as data
//! 6. **stream_id3** - ID3v2 tag at the head of the live stream, ICY headers as fallback

pub mod icecast;
pub mod legacy_html;
pub mod radio_co;
pub mod registry;
pub mod shoutcast;
pub mod stream_id3;
pub mod vendor;

pub use registry::ScraperRegistry;

use crate::config::ScraperSettings;
use crate::error::{ScrapeError, ScrapeResult};
use crate::http::{PrefixLimit, RawContent};
use onair_common::{FetchSource, SongData, StationNowPlayingData};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

/// How the orchestrator obtains content for a strategy
#[derive(Debug, Clone, Copy)]
pub enum FetchPlan {
    /// Whole document with a GET
    Document { timeout: Duration, precheck: bool },
    /// First bytes of an endless stream
    StreamPrefix {
        timeout: Duration,
        limit: PrefixLimit,
        precheck: bool,
    },
}

impl FetchPlan {
    /// Issue a content-type check before fetching
    pub fn precheck(&self) -> bool {
        match self {
            FetchPlan::Document { precheck, .. } | FetchPlan::StreamPrefix { precheck, .. } => {
                *precheck
            }
        }
    }
}

/// Format-specific extractor
pub trait Scraper: Send + Sync {
    /// Category identifier this strategy is registered under
    fn category(&self) -> &str;

    fn fetch_plan(&self, settings: &ScraperSettings) -> FetchPlan {
        FetchPlan::Document {
            timeout: settings.document_timeout(),
            precheck: false,
        }
    }

    /// Whether content of this media type is worth parsing
    fn accepts_content_type(&self, _content_type: &str) -> bool {
        true
    }

    /// Parse fetched content, reporting malformed input as an error
    ///
    /// The orchestrator calls this directly: it records the typed error as
    /// the source's failure and re-raises parse errors in debug mode.
    fn parse(&self, raw: &RawContent, source: &FetchSource) -> ScrapeResult<StationNowPlayingData>;

    /// Parse fetched content; malformed input yields an empty result
    /// carrying the error record instead of failing
    ///
    /// Entry point for callers that hold no task state and want a value
    /// regardless of input quality.
    fn extract(&self, raw: &RawContent, source: &FetchSource) -> StationNowPlayingData {
        match self.parse(raw, source) {
            Ok(data) => data,
            Err(e) => {
                warn!(
                    category = self.category(),
                    url = %source.url,
                    error = %e,
                    "Extraction failed, returning empty result"
                );
                let mut data = StationNowPlayingData::failed(e.kind(), e.to_string());
                data.dirty = source.dirty;
                data
            }
        }
    }
}

/// Parse a JSON body
pub(crate) fn parse_json(raw: &RawContent) -> ScrapeResult<Value> {
    if raw.body.iter().all(u8::is_ascii_whitespace) {
        return Err(ScrapeError::Parse("empty body".to_string()));
    }
    Ok(serde_json::from_slice(&raw.body)?)
}

/// Integer from a JSON number or numeric string, `None` otherwise
pub(crate) fn json_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Non-empty string at a JSON pointer
pub(crate) fn json_str(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Assemble a strategy result with its evidence record
pub(crate) fn now_playing(
    source: &FetchSource,
    song: Option<SongData>,
    listeners: Option<i64>,
    evidence: Value,
) -> StationNowPlayingData {
    let mut data = StationNowPlayingData::empty();
    data.current_song = song.filter(|s| !s.is_empty());
    data.listeners = listeners;
    data.dirty = source.dirty;
    data.push_raw(json!({
        "category": source.category,
        "url": source.url,
        "payload": evidence,
    }));
    data
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_to_i64_variants() {
        assert_eq!(json_to_i64(&json!(42)), Some(42));
        assert_eq!(json_to_i64(&json!("17")), Some(17));
        assert_eq!(json_to_i64(&json!(3.9)), Some(3));
        assert_eq!(json_to_i64(&json!("many")), None);
        assert_eq!(json_to_i64(&json!(null)), None);
    }

    #[test]
    fn test_parse_json_rejects_empty_body() {
        let err = parse_json(&test_support::raw("  ")).unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn test_now_playing_drops_empty_song_and_keeps_dirty() {
        let mut source = FetchSource::new("x", "http://x", 1);
        source.dirty = true;
        let data = now_playing(&source, Some(SongData::default()), Some(3), json!({}));
        assert!(data.current_song.is_none());
        assert_eq!(data.listeners, Some(3));
        assert!(data.dirty);
        assert_eq!(data.raw_data.len(), 1);
    }
}
