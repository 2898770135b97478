//! Scripted HTTP port shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use onair_scraper::error::NetworkErrorKind;
use onair_scraper::http::{FetchError, HttpFetcher, PrefixLimit, RawContent, ResponseMeta};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Clone)]
pub enum Reply {
    Body {
        content_type: Option<&'static str>,
        body: Vec<u8>,
    },
    Fail(NetworkErrorKind),
}

impl Reply {
    pub fn json(body: &str) -> Self {
        Reply::Body {
            content_type: Some("application/json"),
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn typed(content_type: &'static str, body: &[u8]) -> Self {
        Reply::Body {
            content_type: Some(content_type),
            body: body.to_vec(),
        }
    }
}

/// Fake fetcher answering from a URL table and counting every call
#[derive(Default)]
pub struct ScriptedHttp {
    replies: HashMap<String, Reply>,
    pub calls: Mutex<Vec<(&'static str, String)>>,
}

impl ScriptedHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, reply: Reply) -> Self {
        self.replies.insert(url.to_string(), reply);
        self
    }

    /// Content requests (GET or stream read), HEADs excluded
    pub fn fetch_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(method, _)| *method != "HEAD")
            .count()
    }

    pub fn calls_to(&self, url: &str) -> Vec<&'static str> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, u)| u == url)
            .map(|(method, _)| *method)
            .collect()
    }

    fn answer(&self, method: &'static str, url: &str) -> Result<RawContent, FetchError> {
        self.calls.lock().unwrap().push((method, url.to_string()));
        match self.replies.get(url) {
            Some(Reply::Body { content_type, body }) => {
                let mut meta = ResponseMeta {
                    status: 200,
                    headers: HashMap::new(),
                };
                if let Some(ct) = content_type {
                    meta.headers
                        .insert("content-type".to_string(), ct.to_string());
                }
                Ok(RawContent {
                    meta,
                    body: body.clone(),
                })
            }
            Some(Reply::Fail(kind)) => Err(FetchError::new(*kind, "scripted failure")),
            None => Err(FetchError::new(NetworkErrorKind::Connection, "no route")),
        }
    }
}

#[async_trait]
impl HttpFetcher for ScriptedHttp {
    async fn head(&self, url: &str, _timeout: Duration) -> Result<ResponseMeta, FetchError> {
        self.answer("HEAD", url).map(|raw| raw.meta)
    }

    async fn get(&self, url: &str, _timeout: Duration) -> Result<RawContent, FetchError> {
        self.answer("GET", url)
    }

    async fn read_stream_prefix(
        &self,
        url: &str,
        limit: PrefixLimit,
        _timeout: Duration,
    ) -> Result<RawContent, FetchError> {
        self.answer("STREAM", url).map(|mut raw| {
            raw.body.truncate(limit.max_bytes);
            raw
        })
    }
}
