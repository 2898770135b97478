//! Radio.co status API

use super::{json_to_i64, json_str, now_playing, parse_json, Scraper};
use crate::error::{ScrapeError, ScrapeResult};
use crate::http::RawContent;
use crate::normalizer::Normalizer;
use onair_common::{FetchSource, StationNowPlayingData};
use std::sync::Arc;

pub const RADIO_CO_JSON: &str = "radio.co-json";

/// `{current_track:{title, artwork_url_large}, currentlisteners}`
pub struct RadioCoScraper {
    normalizer: Arc<Normalizer>,
}

impl RadioCoScraper {
    pub fn new(normalizer: Arc<Normalizer>) -> Self {
        Self { normalizer }
    }
}

impl Scraper for RadioCoScraper {
    fn category(&self) -> &str {
        RADIO_CO_JSON
    }

    fn parse(&self, raw: &RawContent, source: &FetchSource) -> ScrapeResult<StationNowPlayingData> {
        let value = parse_json(raw)?;
        if !value.is_object() {
            return Err(ScrapeError::Parse("expected a JSON object".to_string()));
        }

        let song = json_str(&value, "/current_track/title").map(|title| {
            let mut song = self.normalizer.parse_title_artist(&title, Some(source));
            song.thumbnail_url = json_str(&value, "/current_track/artwork_url_large");
            song
        });
        let listeners = value.get("currentlisteners").and_then(json_to_i64);

        Ok(now_playing(source, song, listeners, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::test_support::raw;

    #[test]
    fn test_title_and_artwork() {
        let body = r#"{"status":"online","current_track":{"title":"Bonobo - Kerala","start_time":"2024-01-01T00:00:00+00:00","artwork_url_large":"https://i.radio.co/a.jpg"},"currentlisteners":"12"}"#;
        let scraper = RadioCoScraper::new(Arc::new(Normalizer::default()));
        let data = scraper
            .parse(&raw(body), &FetchSource::new(RADIO_CO_JSON, "https://public.radio.co/stations/s/status", 1))
            .unwrap();

        let song = data.current_song.unwrap();
        assert_eq!(song.artist.as_deref(), Some("Bonobo"));
        assert_eq!(song.name.as_deref(), Some("Kerala"));
        assert_eq!(song.thumbnail_url.as_deref(), Some("https://i.radio.co/a.jpg"));
        assert_eq!(data.listeners, Some(12));
    }
}
