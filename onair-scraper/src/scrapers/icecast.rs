//! Icecast `status-json.xsl`
//!
//! `icestats.source` is an object when one mount is active and an array
//! when several are; the first entry is used.

use super::{json_to_i64, json_str, now_playing, parse_json, Scraper};
use crate::error::{ScrapeError, ScrapeResult};
use crate::http::RawContent;
use crate::normalizer::Normalizer;
use onair_common::{FetchSource, SongData, StationNowPlayingData};
use serde_json::Value;
use std::sync::Arc;

pub const ICECAST_JSON: &str = "icecast-json";

pub struct IcecastJsonScraper {
    normalizer: Arc<Normalizer>,
}

impl IcecastJsonScraper {
    pub fn new(normalizer: Arc<Normalizer>) -> Self {
        Self { normalizer }
    }

    fn first_source(value: &Value) -> Option<&Value> {
        match value.pointer("/icestats/source")? {
            Value::Array(entries) => entries.first(),
            entry @ Value::Object(_) => Some(entry),
            _ => None,
        }
    }

    fn song(&self, entry: &Value, source: &FetchSource) -> Option<SongData> {
        let title = json_str(entry, "/title");
        // Some mounts publish artist and title separately
        if let (Some(artist), Some(title)) = (json_str(entry, "/artist"), title.as_ref()) {
            return Some(SongData {
                name: self.normalizer.clean_song_text(title),
                artist: self.normalizer.clean_song_text(&artist),
                thumbnail_url: None,
                raw_title: Some(format!("{}{}{}", artist, source.split_character(), title)),
            });
        }
        title.map(|t| self.normalizer.parse_title_artist(&t, Some(source)))
    }
}

impl Scraper for IcecastJsonScraper {
    fn category(&self) -> &str {
        ICECAST_JSON
    }

    fn parse(&self, raw: &RawContent, source: &FetchSource) -> ScrapeResult<StationNowPlayingData> {
        let value = parse_json(raw)?;
        if value.get("icestats").is_none() {
            return Err(ScrapeError::Parse("missing icestats".to_string()));
        }

        let Some(entry) = Self::first_source(&value) else {
            // Server up, no mount active
            return Ok(now_playing(source, None, None, value));
        };

        let song = self.song(entry, source);
        let listeners = entry.get("listeners").and_then(json_to_i64);
        let entry = entry.clone();

        Ok(now_playing(source, song, listeners, entry))
    }
}
