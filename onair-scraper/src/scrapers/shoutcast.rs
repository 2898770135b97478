//! Shoutcast stats: v2 JSON (`/stats?json=1`) and the flat XML of
//! `/admin.cgi?mode=viewxml` / `/stats`

use super::{json_to_i64, json_str, now_playing, parse_json, Scraper};
use crate::error::{ScrapeError, ScrapeResult};
use crate::http::RawContent;
use crate::normalizer::Normalizer;
use once_cell::sync::Lazy;
use onair_common::{FetchSource, StationNowPlayingData};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const SHOUTCAST_JSON: &str = "shoutcast-json";
pub const SHOUTCAST_XML: &str = "shoutcast-xml";

static XML_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([A-Za-z_][A-Za-z0-9_]*)>([^<]*)</").expect("valid xml tag regex"));

/// `{songtitle, currentlisteners}`
pub struct ShoutcastJsonScraper {
    normalizer: Arc<Normalizer>,
}

impl ShoutcastJsonScraper {
    pub fn new(normalizer: Arc<Normalizer>) -> Self {
        Self { normalizer }
    }
}

impl Scraper for ShoutcastJsonScraper {
    fn category(&self) -> &str {
        SHOUTCAST_JSON
    }

    fn parse(&self, raw: &RawContent, source: &FetchSource) -> ScrapeResult<StationNowPlayingData> {
        let value = parse_json(raw)?;
        if !value.is_object() {
            return Err(ScrapeError::Parse("expected a JSON object".to_string()));
        }

        let song = json_str(&value, "/songtitle")
            .map(|title| self.normalizer.parse_title_artist(&title, Some(source)));
        let listeners = value.get("currentlisteners").and_then(json_to_i64);

        Ok(now_playing(source, song, listeners, value))
    }
}

/// Flat `<TAG>value</TAG>` stats document
pub struct ShoutcastXmlScraper {
    normalizer: Arc<Normalizer>,
}

impl ShoutcastXmlScraper {
    pub fn new(normalizer: Arc<Normalizer>) -> Self {
        Self { normalizer }
    }
}

/// All `<TAG>value</` pairs, tag names uppercased, first occurrence wins
pub fn xml_tag_pairs(text: &str) -> Map<String, Value> {
    let mut pairs = Map::new();
    for caps in XML_TAG.captures_iter(text) {
        let tag = caps[1].to_ascii_uppercase();
        let value = caps[2].trim().to_string();
        pairs.entry(tag).or_insert(Value::String(value));
    }
    pairs
}

impl Scraper for ShoutcastXmlScraper {
    fn category(&self) -> &str {
        SHOUTCAST_XML
    }

    fn parse(&self, raw: &RawContent, source: &FetchSource) -> ScrapeResult<StationNowPlayingData> {
        let text = raw.text();
        let pairs = xml_tag_pairs(&text);
        if pairs.is_empty() {
            return Err(ScrapeError::Parse("no XML stats tags found".to_string()));
        }

        let value = Value::Object(pairs);
        let song = json_str(&value, "/SONGTITLE")
            .map(|title| self.normalizer.parse_title_artist(&title, Some(source)));
        let listeners = value.get("CURRENTLISTENERS").and_then(json_to_i64);

        Ok(now_playing(source, song, listeners, value))
    }
}
