//! Bounded HTTP access for scrapers, the uptime prober and the RSS path
//!
//! Every operation takes an explicit timeout. Reading the head of a live
//! audio stream is blocking by nature and runs on the blocking thread pool so
//! it never stalls the orchestrator.

use crate::error::{NetworkErrorKind, ScrapeError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Read;
use std::time::Duration;
use tracing::{debug, warn};

/// Headers and status of a response, names lowercased
#[derive(Debug, Clone, Default)]
pub struct ResponseMeta {
    pub status: u16,
    pub headers: HashMap<String, String>,
}

impl ResponseMeta {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Media type without parameters, lowercased
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type").map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }
}

/// Fetched bytes plus the response metadata they came with
#[derive(Debug, Clone, Default)]
pub struct RawContent {
    pub meta: ResponseMeta,
    pub body: Vec<u8>,
}

impl RawContent {
    /// Body decoded as UTF-8, invalid sequences replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Limits for reading the head of an endless stream
#[derive(Debug, Clone, Copy)]
pub struct PrefixLimit {
    pub max_bytes: usize,
    /// Stop early once the bytes read so far are sufficient
    pub complete: fn(&[u8]) -> bool,
}

/// Network failure of one fetch
#[derive(Debug, Clone)]
pub struct FetchError {
    pub kind: NetworkErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn into_scrape_error(self, url: &str) -> ScrapeError {
        ScrapeError::Network {
            url: url.to_string(),
            kind: self.kind,
            message: self.message,
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// HTTP port used by the orchestrator
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// Lightweight existence/content-type check
    async fn head(&self, url: &str, timeout: Duration) -> Result<ResponseMeta, FetchError>;

    /// Fetch a complete document
    async fn get(&self, url: &str, timeout: Duration) -> Result<RawContent, FetchError>;

    /// Read at most `limit.max_bytes` from the start of a live stream
    async fn read_stream_prefix(
        &self,
        url: &str,
        limit: PrefixLimit,
        timeout: Duration,
    ) -> Result<RawContent, FetchError>;
}

/// reqwest-backed implementation
pub struct ReqwestFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl ReqwestFetcher {
    pub fn new(user_agent: impl Into<String>) -> Result<Self, FetchError> {
        let user_agent = user_agent.into();
        let client = reqwest::Client::builder()
            .user_agent(user_agent.clone())
            .pool_idle_timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| FetchError::new(NetworkErrorKind::Other, e.to_string()))?;
        Ok(Self { client, user_agent })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    fn classify_error(e: &reqwest::Error) -> NetworkErrorKind {
        if e.is_timeout() {
            NetworkErrorKind::Timeout
        } else if e.is_connect() {
            NetworkErrorKind::Connection
        } else if e.is_body() || e.is_decode() {
            NetworkErrorKind::Body
        } else if let Some(status) = e.status() {
            NetworkErrorKind::Status(status.as_u16())
        } else {
            NetworkErrorKind::Other
        }
    }

    fn meta_from(status: reqwest::StatusCode, headers: &reqwest::header::HeaderMap) -> ResponseMeta {
        ResponseMeta {
            status: status.as_u16(),
            headers: collect_headers(headers),
        }
    }
}

/// Lowercased header map; non-UTF-8 values are dropped
pub fn collect_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

fn check_status(status: u16, url: &str) -> Result<(), FetchError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        warn!(url, status, "Non-success HTTP status");
        Err(FetchError::new(
            NetworkErrorKind::Status(status),
            format!("unexpected status {}", status),
        ))
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn head(&self, url: &str, timeout: Duration) -> Result<ResponseMeta, FetchError> {
        debug!(url, "HTTP HEAD start");
        let resp = self
            .client
            .head(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::new(Self::classify_error(&e), e.to_string()))?;
        Ok(Self::meta_from(resp.status(), resp.headers()))
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<RawContent, FetchError> {
        let start = tokio::time::Instant::now();
        debug!(url, "HTTP GET start");
        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                warn!(url, error = %e, "HTTP GET failed");
                FetchError::new(Self::classify_error(&e), e.to_string())
            })?;

        let meta = Self::meta_from(resp.status(), resp.headers());
        check_status(meta.status, url)?;

        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::new(Self::classify_error(&e), e.to_string()))?;

        debug!(
            url,
            bytes = body.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "HTTP GET complete"
        );
        Ok(RawContent {
            meta,
            body: body.to_vec(),
        })
    }

    async fn read_stream_prefix(
        &self,
        url: &str,
        limit: PrefixLimit,
        timeout: Duration,
    ) -> Result<RawContent, FetchError> {
        let owned_url = url.to_string();
        let user_agent = self.user_agent.clone();

        let handle = tokio::task::spawn_blocking(move || {
            read_prefix_blocking(&owned_url, &user_agent, limit, timeout)
        });

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(FetchError::new(
                NetworkErrorKind::Other,
                format!("stream reader task failed: {}", join_err),
            )),
            Err(_) => Err(FetchError::new(
                NetworkErrorKind::Timeout,
                format!("stream read exceeded {} ms", timeout.as_millis()),
            )),
        }
    }
}

/// Blocking stream head reader, run on the blocking pool
fn read_prefix_blocking(
    url: &str,
    user_agent: &str,
    limit: PrefixLimit,
    timeout: Duration,
) -> Result<RawContent, FetchError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(|e| FetchError::new(NetworkErrorKind::Other, e.to_string()))?;

    let classify = |e: &reqwest::Error| ReqwestFetcher::classify_error(e);

    let mut resp = client
        .get(url)
        .send()
        .map_err(|e| FetchError::new(classify(&e), e.to_string()))?;

    let meta = ReqwestFetcher::meta_from(resp.status(), resp.headers());
    check_status(meta.status, url)?;

    let mut body = Vec::with_capacity(limit.max_bytes.min(64 * 1024));
    let mut chunk = [0u8; 4096];
    while body.len() < limit.max_bytes && !(limit.complete)(&body) {
        let want = chunk.len().min(limit.max_bytes - body.len());
        match resp.read(&mut chunk[..want]) {
            Ok(0) => break,
            Ok(n) => body.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                if body.is_empty() {
                    let kind = if e.kind() == std::io::ErrorKind::TimedOut {
                        NetworkErrorKind::Timeout
                    } else {
                        NetworkErrorKind::Body
                    };
                    return Err(FetchError::new(kind, e.to_string()));
                }
                // Partial head is still useful to the parser
                debug!(url, bytes = body.len(), error = %e, "Stream read ended early");
                break;
            }
        }
    }

    debug!(url, bytes = body.len(), "Stream prefix read");
    Ok(RawContent { meta, body })
}
