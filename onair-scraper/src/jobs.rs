//! Per-station jobs: scrape, uptime probe, RSS
//!
//! Each job runs one station end to end and hands its output to a
//! `ResultSink`. Stations are independent, so callers may run any number of
//! jobs in parallel.

use crate::config::{ScraperSettings, StationConfig};
use crate::error::ScrapeResult;
use crate::http::HttpFetcher;
use crate::orchestrator::{FetchOrchestrator, ScrapeSummary};
use crate::rss;
use crate::uptime::UptimeProber;
use async_trait::async_trait;
use onair_common::{Result, RssPost, StationNowPlayingData, StationUptimeData};
use std::sync::Arc;
use tracing::{debug, info};

/// Receives job output for persistence
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn save_now_playing(&self, station_id: &str, data: &StationNowPlayingData) -> Result<()>;

    async fn save_uptime(&self, station_id: &str, data: &StationUptimeData) -> Result<()>;

    /// Insert or update posts keyed by `(station_id, link)`; returns the count written
    async fn upsert_rss_posts(&self, station_id: &str, posts: &[RssPost]) -> Result<usize>;
}

#[derive(Clone)]
pub struct JobRunner {
    orchestrator: Arc<FetchOrchestrator>,
    prober: Arc<UptimeProber>,
    http: Arc<dyn HttpFetcher>,
    sink: Arc<dyn ResultSink>,
    settings: ScraperSettings,
}

impl JobRunner {
    pub fn new(
        orchestrator: Arc<FetchOrchestrator>,
        prober: Arc<UptimeProber>,
        http: Arc<dyn HttpFetcher>,
        sink: Arc<dyn ResultSink>,
        settings: ScraperSettings,
    ) -> Self {
        Self {
            orchestrator,
            prober,
            http,
            sink,
            settings,
        }
    }

    /// Scrape a station and persist the merged result, if any
    pub async fn scrape(&self, station: &StationConfig) -> ScrapeResult<ScrapeSummary> {
        let summary = self.orchestrator.run(&station.id, &station.sources).await?;
        if let Some(merged) = &summary.merged_result {
            self.sink.save_now_playing(&station.id, merged).await?;
        }
        Ok(summary)
    }

    /// Probe the station's stream; `None` without a configured stream URL
    pub async fn uptime(&self, station: &StationConfig) -> ScrapeResult<Option<StationUptimeData>> {
        let Some(url) = station.stream_url.as_deref() else {
            debug!(station_id = %station.id, "No stream URL, uptime skipped");
            return Ok(None);
        };
        let data = self.prober.probe(url).await;
        self.sink.save_uptime(&station.id, &data).await?;
        Ok(Some(data))
    }

    /// Fetch the station's feed and upsert its posts; `None` without a feed URL
    pub async fn rss(&self, station: &StationConfig) -> ScrapeResult<Option<usize>> {
        let Some(url) = station.rss_url.as_deref() else {
            debug!(station_id = %station.id, "No RSS URL, feed skipped");
            return Ok(None);
        };
        let posts = rss::fetch_posts(self.http.as_ref(), url, self.settings.rss_timeout()).await?;
        let written = self.sink.upsert_rss_posts(&station.id, &posts).await?;
        info!(station_id = %station.id, posts = written, "RSS posts stored");
        Ok(Some(written))
    }
}
