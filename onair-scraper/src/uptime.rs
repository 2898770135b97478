//! Live stream availability probe
//!
//! Reads the first few kilobytes of a station's stream and asks symphonia
//! whether they hold an audio track. The whole probe, playlist resolution
//! and one reconnect included, runs inside a single timeout budget.

use crate::config::ScraperSettings;
use crate::error::{NetworkErrorKind, ProbeError};
use crate::http::{FetchError, HttpFetcher, PrefixLimit};
use chrono::Utc;
use onair_common::StationUptimeData;
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

const MAX_ATTEMPTS: u32 = 2;
const PLAYLIST_TYPES: &[&str] = &[
    "audio/x-mpegurl",
    "audio/mpegurl",
    "audio/x-scpls",
    "application/pls+xml",
];

/// What the probe saw, written into `raw_data` whether it succeeded or not
#[derive(Debug, Default, Clone)]
struct ProbeDiagnostics {
    resolved_url: Option<String>,
    content_type: Option<String>,
    bytes_read: usize,
    attempts: u32,
    codec: Option<String>,
}

impl ProbeDiagnostics {
    fn to_json(&self, url: &str, error: Option<&ProbeError>) -> serde_json::Value {
        let mut value = json!({
            "url": url,
            "resolved_url": self.resolved_url,
            "content_type": self.content_type,
            "bytes_read": self.bytes_read,
            "attempts": self.attempts,
            "codec": self.codec,
        });
        if let Some(err) = error {
            value["error_type"] = json!(err.error_type());
            value["message"] = json!(err.to_string());
        }
        value
    }
}

fn never_complete(_: &[u8]) -> bool {
    false
}

/// First stream URL listed in an M3U or PLS playlist
pub fn parse_playlist(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| match line.split_once('=') {
            // PLS: FileN=url
            Some((key, value)) if key.to_ascii_lowercase().starts_with("file") => value.trim(),
            _ => line,
        })
        .find(|candidate| candidate.starts_with("http://") || candidate.starts_with("https://"))
        .map(String::from)
}

fn is_playlist_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or_default().to_ascii_lowercase();
    path.ends_with(".m3u") || path.ends_with(".pls")
}

fn probe_error_from(err: &FetchError, timeout: Duration) -> ProbeError {
    match err.kind {
        NetworkErrorKind::Timeout => ProbeError::Timeout {
            after_ms: timeout.as_millis() as u64,
        },
        NetworkErrorKind::Connection | NetworkErrorKind::Body => {
            ProbeError::Connection(err.message.clone())
        }
        NetworkErrorKind::Status(_) | NetworkErrorKind::Other => ProbeError::Protocol(err.to_string()),
    }
}

/// Detect an audio track in the head of a stream
///
/// Returns the codec short name. Runs on the blocking pool.
pub async fn detect_audio_stream(
    bytes: Vec<u8>,
    content_type: Option<String>,
) -> Result<String, ProbeError> {
    tokio::task::spawn_blocking(move || probe_audio(bytes, content_type.as_deref()))
        .await
        .map_err(|e| ProbeError::Protocol(format!("probe task failed: {}", e)))?
}

fn probe_audio(bytes: Vec<u8>, content_type: Option<&str>) -> Result<String, ProbeError> {
    if bytes.is_empty() {
        return Err(ProbeError::NoAudioStream("no bytes received".to_string()));
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let mut hint = Hint::new();
    if let Some(content_type) = content_type {
        hint.mime_type(content_type);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ProbeError::NoAudioStream(e.to_string()))?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ProbeError::NoAudioStream("container has no audio track".to_string()))?;

    let codec = symphonia::default::get_codecs()
        .get_codec(track.codec_params.codec)
        .map(|descriptor| descriptor.short_name.to_string())
        .unwrap_or_else(|| format!("{:?}", track.codec_params.codec));
    Ok(codec)
}

pub struct UptimeProber {
    http: Arc<dyn HttpFetcher>,
    timeout: Duration,
    read_bytes: usize,
}

impl UptimeProber {
    pub fn new(http: Arc<dyn HttpFetcher>, settings: &ScraperSettings) -> Self {
        Self {
            http,
            timeout: settings.probe_timeout(),
            read_bytes: settings.probe_read_bytes,
        }
    }

    /// Probe a stream; failures come back as `is_up = false` with diagnostics
    pub async fn probe(&self, stream_url: &str) -> StationUptimeData {
        let start = Instant::now();
        let mut diagnostics = ProbeDiagnostics::default();

        let outcome = tokio::time::timeout(self.timeout, self.run(stream_url, start, &mut diagnostics))
            .await
            .unwrap_or(Err(ProbeError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            }));
        let latency_ms = start.elapsed().as_millis() as i64;

        match outcome {
            Ok(codec) => {
                info!(url = stream_url, codec = %codec, latency_ms, "Stream is up");
                diagnostics.codec = Some(codec);
                StationUptimeData {
                    timestamp: Utc::now(),
                    is_up: true,
                    latency_ms,
                    raw_data: vec![diagnostics.to_json(stream_url, None)],
                }
            }
            Err(err) => {
                warn!(
                    url = stream_url,
                    error_type = err.error_type(),
                    error = %err,
                    latency_ms,
                    "Stream is down"
                );
                StationUptimeData {
                    timestamp: Utc::now(),
                    is_up: false,
                    latency_ms,
                    raw_data: vec![diagnostics.to_json(stream_url, Some(&err))],
                }
            }
        }
    }

    async fn run(
        &self,
        stream_url: &str,
        start: Instant,
        diagnostics: &mut ProbeDiagnostics,
    ) -> Result<String, ProbeError> {
        let mut url = if is_playlist_url(stream_url) {
            self.resolve_playlist(stream_url, start).await?
        } else {
            stream_url.to_string()
        };
        diagnostics.resolved_url = Some(url.clone());

        let limit = PrefixLimit {
            max_bytes: self.read_bytes,
            complete: never_complete,
        };
        let mut followed_playlist = is_playlist_url(stream_url);

        let mut attempt = 0;
        loop {
            attempt += 1;
            diagnostics.attempts = attempt;
            let remaining = self.remaining(start);

            let raw = match self.http.read_stream_prefix(&url, limit, remaining).await {
                Ok(raw) => raw,
                Err(e) => {
                    let err = probe_error_from(&e, self.timeout);
                    if attempt < MAX_ATTEMPTS && matches!(err, ProbeError::Connection(_)) {
                        debug!(url = %url, error = %e, "Stream dropped, reconnecting");
                        continue;
                    }
                    return Err(err);
                }
            };

            let content_type = raw.meta.content_type();
            diagnostics.bytes_read = raw.body.len();
            diagnostics.content_type = content_type.clone();

            if let Some(ct) = content_type.as_deref() {
                if PLAYLIST_TYPES.contains(&ct) && !followed_playlist {
                    url = parse_playlist(&raw.text()).ok_or_else(|| {
                        ProbeError::Protocol("playlist lists no stream".to_string())
                    })?;
                    diagnostics.resolved_url = Some(url.clone());
                    followed_playlist = true;
                    attempt -= 1;
                    continue;
                }
                if ct.starts_with("text/") {
                    return Err(ProbeError::Protocol(format!("unexpected content type {}", ct)));
                }
            }

            let short_read = raw.body.len() < self.read_bytes;
            match detect_audio_stream(raw.body, content_type).await {
                Ok(codec) => return Ok(codec),
                // Server closed the connection before enough data arrived
                Err(err) if short_read && attempt < MAX_ATTEMPTS => {
                    debug!(url = %url, error = %err, "Short read, reconnecting");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn resolve_playlist(&self, url: &str, start: Instant) -> Result<String, ProbeError> {
        let raw = self
            .http
            .get(url, self.remaining(start))
            .await
            .map_err(|e| probe_error_from(&e, self.timeout))?;
        let resolved = parse_playlist(&raw.text())
            .ok_or_else(|| ProbeError::Protocol("playlist lists no stream".to_string()))?;
        debug!(playlist = url, stream = %resolved, "Resolved playlist");
        Ok(resolved)
    }

    fn remaining(&self, start: Instant) -> Duration {
        self.timeout.saturating_sub(start.elapsed())
    }
}
