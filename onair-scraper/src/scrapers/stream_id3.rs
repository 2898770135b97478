//! ID3v2 tag at the head of a live stream
//!
//! Some stations prepend an ID3v2 tag to every connection. The orchestrator
//! reads the stream prefix on the blocking pool (see `FetchPlan::StreamPrefix`)
//! and stops as soon as the whole tag has arrived. ICY headers are the
//! fallback when there is no usable tag.

use super::{now_playing, FetchPlan, Scraper};
use crate::config::ScraperSettings;
use crate::error::ScrapeResult;
use crate::http::{PrefixLimit, RawContent};
use crate::normalizer::Normalizer;
use id3::TagLike;
use onair_common::{FetchSource, SongData, StationNowPlayingData};
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

pub const STREAM_ID3: &str = "stream-id3";

const HEADER_LEN: usize = 10;
const FOOTER_FLAG: u8 = 0x10;

/// Total length of the ID3v2 tag starting at `buf[0]`, header included
///
/// `None` when `buf` does not start with a complete ID3v2 header.
pub fn id3_tag_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < HEADER_LEN || &buf[..3] != b"ID3" {
        return None;
    }
    let size = buf[6..10]
        .iter()
        .fold(0usize, |acc, b| (acc << 7) | usize::from(b & 0x7f));
    let footer = if buf[5] & FOOTER_FLAG != 0 { HEADER_LEN } else { 0 };
    Some(HEADER_LEN + size + footer)
}

/// Stop reading once the tag is complete or the stream has no tag
fn prefix_complete(buf: &[u8]) -> bool {
    if buf.len() < 3 {
        return false;
    }
    if &buf[..3] != b"ID3" {
        return true;
    }
    id3_tag_len(buf).is_some_and(|len| buf.len() >= len)
}

pub struct StreamId3Scraper {
    normalizer: Arc<Normalizer>,
}

impl StreamId3Scraper {
    pub fn new(normalizer: Arc<Normalizer>) -> Self {
        Self { normalizer }
    }

    fn from_tag(&self, body: &[u8], source: &FetchSource) -> Option<SongData> {
        let len = id3_tag_len(body)?;
        if body.len() < len {
            debug!(url = %source.url, have = body.len(), need = len, "Truncated ID3 tag");
        }
        let tag = match id3::Tag::read_from2(Cursor::new(body)) {
            Ok(tag) => tag,
            Err(e) => {
                debug!(url = %source.url, error = %e, "Unreadable ID3 tag");
                return None;
            }
        };

        let title = tag.title().map(str::trim).filter(|t| !t.is_empty())?;
        match tag.artist().map(str::trim).filter(|a| !a.is_empty()) {
            Some(artist) => Some(SongData {
                name: self.normalizer.clean_song_text(title),
                artist: self.normalizer.clean_song_text(artist),
                thumbnail_url: None,
                raw_title: Some(format!("{}{}{}", artist, source.split_character(), title)),
            }),
            None => Some(self.normalizer.parse_title_artist(title, Some(source))),
        }
    }

    fn from_icy(&self, raw: &RawContent) -> Option<SongData> {
        let title = raw
            .meta
            .header("icy-title")
            .or_else(|| raw.meta.header("icy-name"))
            .map(str::trim)
            .filter(|t| !t.is_empty())?;
        Some(SongData {
            name: self.normalizer.clean_song_text(title),
            raw_title: Some(title.to_string()),
            ..SongData::default()
        })
    }
}

impl Scraper for StreamId3Scraper {
    fn category(&self) -> &str {
        STREAM_ID3
    }

    fn fetch_plan(&self, settings: &ScraperSettings) -> FetchPlan {
        FetchPlan::StreamPrefix {
            timeout: settings.stream_timeout(),
            limit: PrefixLimit {
                max_bytes: settings.stream_read_limit_bytes,
                complete: prefix_complete,
            },
            precheck: true,
        }
    }

    /// A text response is a status page, not the stream
    fn accepts_content_type(&self, content_type: &str) -> bool {
        !content_type.starts_with("text/")
    }

    fn parse(&self, raw: &RawContent, source: &FetchSource) -> ScrapeResult<StationNowPlayingData> {
        let tag_song = self.from_tag(&raw.body, source);
        let used_tag = tag_song.is_some();
        let song = tag_song.or_else(|| self.from_icy(raw));

        let evidence = json!({
            "bytes_read": raw.body.len(),
            "id3": used_tag,
            "icy_name": raw.meta.header("icy-name"),
            "icy_title": raw.meta.header("icy-title"),
            "raw_title": song.as_ref().and_then(|s| s.raw_title.clone()),
        });

        Ok(now_playing(source, song, None, evidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ResponseMeta;
    use id3::{Tag, Version};

    fn tagged_stream(title: &str, artist: Option<&str>) -> Vec<u8> {
        let mut tag = Tag::new();
        tag.set_title(title);
        if let Some(artist) = artist {
            tag.set_artist(artist);
        }
        let mut buf = Vec::new();
        tag.write_to(&mut buf, Version::Id3v24).unwrap();
        // Followed by an MPEG frame header and audio
        buf.extend_from_slice(&[0xff, 0xfb, 0x90, 0x64]);
        buf.extend(std::iter::repeat(0u8).take(512));
        buf
    }

    fn scraper() -> StreamId3Scraper {
        StreamId3Scraper::new(Arc::new(Normalizer::default()))
    }

    fn source() -> FetchSource {
        FetchSource::new(STREAM_ID3, "http://stream.example/live", 1)
    }

    #[test]
    fn test_synchsafe_size() {
        // size bytes 0x00 0x00 0x02 0x01 => (2 << 7) | 1 = 257
        let header = [b'I', b'D', b'3', 4, 0, 0, 0, 0, 2, 1];
        assert_eq!(id3_tag_len(&header), Some(267));

        let with_footer = [b'I', b'D', b'3', 4, 0, FOOTER_FLAG, 0, 0, 0, 5];
        assert_eq!(id3_tag_len(&with_footer), Some(25));

        assert_eq!(id3_tag_len(b"ID3"), None);
        assert_eq!(id3_tag_len(&[0xff; 10]), None);
    }

    #[test]
    fn test_prefix_complete() {
        let stream = tagged_stream("Song Title", Some("Artist Name"));
        let len = id3_tag_len(&stream).unwrap();
        assert!(!prefix_complete(&stream[..len - 1]));
        assert!(prefix_complete(&stream[..len]));
        assert!(prefix_complete(&[0xff, 0xfb, 0x90]));
        assert!(!prefix_complete(b"ID"));
    }

    #[test]
    fn test_reads_title_and_artist_frames() {
        let raw = RawContent {
            meta: ResponseMeta::default(),
            body: tagged_stream("Unfinished Sympathy", Some("Massive Attack")),
        };
        let data = scraper().parse(&raw, &source()).unwrap();
        assert_eq!(data.song_name(), Some("Unfinished Sympathy"));
        assert_eq!(data.song_artist(), Some("Massive Attack"));
        assert_eq!(data.listeners, None);
    }

    #[test]
    fn test_title_frame_only_is_split() {
        let raw = RawContent {
            meta: ResponseMeta::default(),
            body: tagged_stream("Air - Sexy Boy", None),
        };
        let data = scraper().parse(&raw, &source()).unwrap();
        assert_eq!(data.song_artist(), Some("Air"));
        assert_eq!(data.song_name(), Some("Sexy Boy"));
    }

    #[test]
    fn test_icy_header_fallback_is_title_only() {
        let mut meta = ResponseMeta::default();
        meta.headers
            .insert("icy-name".to_string(), "Night Drive Radio".to_string());
        let raw = RawContent {
            meta,
            body: vec![0xff, 0xfb, 0x90, 0x64, 0, 0, 0],
        };
        let data = scraper().parse(&raw, &source()).unwrap();
        assert_eq!(data.song_name(), Some("Night Drive Radio"));
        assert_eq!(data.song_artist(), None);
    }

    #[test]
    fn test_rejects_text_content() {
        assert!(!scraper().accepts_content_type("text/html"));
        assert!(scraper().accepts_content_type("audio/mpeg"));
    }
}
