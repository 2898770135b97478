//! Icecast and Shoutcast HTML status pages
//!
//! Both servers render their stats as two-column tables, label cell
//! followed by value cell. Row pairs are pulled out with a regex; the page
//! is never parsed as a DOM.

use super::{now_playing, FetchPlan, Scraper};
use crate::config::ScraperSettings;
use crate::error::{ScrapeError, ScrapeResult};
use crate::http::RawContent;
use crate::normalizer::{decode_html_entities, Normalizer};
use once_cell::sync::Lazy;
use onair_common::{FetchSource, StationNowPlayingData};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const ICECAST_HTML: &str = "icecast-html";
pub const SHOUTCAST_HTML: &str = "shoutcast-html";

static TABLE_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<td[^>]*>(.*?)</td>\s*<td[^>]*>(.*?)</td>").expect("valid table row regex")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));
static UNIQUE_LISTENERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((\d+)\s+unique\)").expect("valid unique listeners regex"));

/// Label/value pairs of every two-cell table row, tags stripped
pub fn table_row_pairs(html: &str) -> Vec<(String, String)> {
    TABLE_ROW
        .captures_iter(html)
        .map(|caps| (strip_tags(&caps[1]), strip_tags(&caps[2])))
        .filter(|(label, _)| !label.is_empty())
        .collect()
}

fn strip_tags(fragment: &str) -> String {
    let text = TAG.replace_all(fragment, " ");
    decode_html_entities(text.split_whitespace().collect::<Vec<_>>().join(" ").as_str())
}

fn lookup<'a>(rows: &'a [(String, String)], labels: &[&str]) -> Option<&'a str> {
    rows.iter()
        .find(|(label, _)| labels.iter().any(|l| label.eq_ignore_ascii_case(l)))
        .map(|(_, value)| value.as_str())
        .filter(|v| !v.is_empty())
}

fn evidence(rows: &[(String, String)]) -> Value {
    let map: Map<String, Value> = rows
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    Value::Object(map)
}

/// Which server rendered the page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HtmlFlavor {
    Icecast,
    Shoutcast,
}

pub struct LegacyHtmlScraper {
    flavor: HtmlFlavor,
    normalizer: Arc<Normalizer>,
}

impl LegacyHtmlScraper {
    pub fn new(flavor: HtmlFlavor, normalizer: Arc<Normalizer>) -> Self {
        Self { flavor, normalizer }
    }

    fn listeners(&self, rows: &[(String, String)]) -> Option<i64> {
        match self.flavor {
            HtmlFlavor::Icecast => lookup(rows, &["Current Listeners:", "Listeners (current):"])
                .and_then(|v| v.trim().parse().ok()),
            HtmlFlavor::Shoutcast => rows.iter().find_map(|(_, value)| {
                UNIQUE_LISTENERS
                    .captures(value)
                    .and_then(|caps| caps[1].parse().ok())
            }),
        }
    }
}

impl Scraper for LegacyHtmlScraper {
    fn category(&self) -> &str {
        match self.flavor {
            HtmlFlavor::Icecast => ICECAST_HTML,
            HtmlFlavor::Shoutcast => SHOUTCAST_HTML,
        }
    }

    fn fetch_plan(&self, settings: &ScraperSettings) -> FetchPlan {
        FetchPlan::Document {
            timeout: settings.document_timeout(),
            precheck: true,
        }
    }

    /// Status pages are sometimes configured on the mount itself
    fn accepts_content_type(&self, content_type: &str) -> bool {
        !content_type.starts_with("audio/")
    }

    fn parse(&self, raw: &RawContent, source: &FetchSource) -> ScrapeResult<StationNowPlayingData> {
        let rows = table_row_pairs(&raw.text());
        if rows.is_empty() {
            return Err(ScrapeError::Parse("no status table rows".to_string()));
        }

        let song = lookup(&rows, &["Current Song:"])
            .map(|title| self.normalizer.parse_title_artist(title, Some(source)));
        let listeners = self.listeners(&rows);

        Ok(now_playing(source, song, listeners, evidence(&rows)))
    }
}
