//! Error types for onair-scraper
//!
//! A single source failing never aborts a station's scrape cycle: the
//! orchestrator turns these errors into per-source records. Only
//! `Store` errors (the task state could not be read or written) end a run.

use thiserror::Error;

/// Coarse classification of a failed network operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    Timeout,
    Connection,
    /// Non-success HTTP status
    Status(u16),
    /// Response started but the body could not be read
    Body,
    Other,
}

impl std::fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkErrorKind::Timeout => write!(f, "timeout"),
            NetworkErrorKind::Connection => write!(f, "connection"),
            NetworkErrorKind::Status(code) => write!(f, "http {}", code),
            NetworkErrorKind::Body => write!(f, "body"),
            NetworkErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Uptime probe failure subtypes
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("probe timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("no audio stream detected: {0}")]
    NoAudioStream(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection error: {0}")]
    Connection(String),
}

impl ProbeError {
    /// Stable label written into uptime diagnostics
    pub fn error_type(&self) -> &'static str {
        match self {
            ProbeError::Timeout { .. } => "timeout",
            ProbeError::NoAudioStream(_) => "no_audio_stream",
            ProbeError::Protocol(_) => "protocol",
            ProbeError::Connection(_) => "connection",
        }
    }
}

/// Scraping error taxonomy
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// No strategy registered for a source category
    #[error("no scraper for category '{0}'")]
    UnknownCategory(String),

    /// Fetch failed (timeout, connection, status)
    #[error("network error ({kind}) fetching {url}: {message}")]
    Network {
        url: String,
        kind: NetworkErrorKind,
        message: String,
    },

    /// Malformed upstream payload
    #[error("parse error: {0}")]
    Parse(String),

    /// This task no longer owns the station
    #[error("task superseded for station {station_id}")]
    ConcurrencyConflict { station_id: String },

    #[error("probe failed: {0}")]
    Probe(#[from] ProbeError),

    /// Task state or result storage failed
    #[error("store error: {0}")]
    Store(#[from] onair_common::Error),
}

impl ScrapeError {
    /// Short label used in per-source error records
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::UnknownCategory(_) => "unknown_category",
            ScrapeError::Network { .. } => "network",
            ScrapeError::Parse(_) => "parse",
            ScrapeError::ConcurrencyConflict { .. } => "concurrency_conflict",
            ScrapeError::Probe(_) => "probe",
            ScrapeError::Store(_) => "store",
        }
    }
}

impl From<serde_json::Error> for ScrapeError {
    fn from(err: serde_json::Error) -> Self {
        ScrapeError::Parse(err.to_string())
    }
}

/// Result type for scraping operations
pub type ScrapeResult<T> = Result<T, ScrapeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_error_maps_to_parse() {
        let err: ScrapeError = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn test_network_error_message_names_kind() {
        let err = ScrapeError::Network {
            url: "http://a".to_string(),
            kind: NetworkErrorKind::Status(503),
            message: "Service Unavailable".to_string(),
        };
        assert!(err.to_string().contains("http 503"));
    }

    #[test]
    fn test_probe_error_types_are_distinct() {
        assert_eq!(ProbeError::Timeout { after_ms: 1 }.error_type(), "timeout");
        assert_eq!(ProbeError::Protocol("x".into()).error_type(), "protocol");
        assert_ne!(
            ProbeError::Connection("x".into()).error_type(),
            ProbeError::Timeout { after_ms: 1 }.error_type()
        );
    }
}
