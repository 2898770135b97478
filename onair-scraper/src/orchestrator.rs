//! Per-station scrape cycle
//!
//! Sources are tried highest priority first. Every outcome is written
//! through the coordinator, whose live merge decides the early exit: once
//! the merge has both song name and artist, lower-priority sources are not
//! fetched at all.

use crate::config::ScraperSettings;
use crate::coordinator::TaskStateCoordinator;
use crate::error::{ScrapeError, ScrapeResult};
use crate::http::{HttpFetcher, RawContent};
use crate::scrapers::{FetchPlan, Scraper, ScraperRegistry};
use onair_common::{uuid_utils, FetchSource, FetcherOutcome, StationNowPlayingData};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of one station run
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeSummary {
    pub station_id: String,
    pub task_id: Uuid,
    pub success: bool,
    /// Another task owned the station, or took it over mid-run
    pub superseded: bool,
    /// Sources whose content was parsed successfully
    pub scraped_count: usize,
    pub errors: Vec<String>,
    /// Sources skipped on content type
    pub skipped: Vec<String>,
    pub merged_result: Option<StationNowPlayingData>,
}

impl ScrapeSummary {
    fn new(station_id: &str, task_id: Uuid) -> Self {
        Self {
            station_id: station_id.to_string(),
            task_id,
            success: false,
            superseded: false,
            scraped_count: 0,
            errors: Vec::new(),
            skipped: Vec::new(),
            merged_result: None,
        }
    }
}

/// What happened to one source
enum SourceStep {
    Recorded(FetcherOutcome),
    Skipped(String),
}

pub struct FetchOrchestrator {
    registry: Arc<ScraperRegistry>,
    coordinator: Arc<TaskStateCoordinator>,
    http: Arc<dyn HttpFetcher>,
    settings: ScraperSettings,
}

impl FetchOrchestrator {
    pub fn new(
        registry: Arc<ScraperRegistry>,
        coordinator: Arc<TaskStateCoordinator>,
        http: Arc<dyn HttpFetcher>,
        settings: ScraperSettings,
    ) -> Self {
        Self {
            registry,
            coordinator,
            http,
            settings,
        }
    }

    /// Run one scrape cycle for a station under a fresh task id
    pub async fn run(&self, station_id: &str, sources: &[FetchSource]) -> ScrapeResult<ScrapeSummary> {
        self.run_task(station_id, uuid_utils::generate(), sources).await
    }

    /// Run one scrape cycle under a caller-chosen task id
    pub async fn run_task(
        &self,
        station_id: &str,
        task_id: Uuid,
        sources: &[FetchSource],
    ) -> ScrapeResult<ScrapeSummary> {
        let mut summary = ScrapeSummary::new(station_id, task_id);

        let init = match self.coordinator.initialize(station_id, task_id).await {
            Ok(init) => init,
            Err(ScrapeError::ConcurrencyConflict { .. }) => {
                info!(station_id, task_id = %task_id, "Station contended, run skipped");
                summary.superseded = true;
                return Ok(summary);
            }
            Err(e) => return Err(e),
        };
        if !init.should_continue {
            info!(station_id, task_id = %task_id, "Station busy, run skipped");
            summary.superseded = true;
            return Ok(summary);
        }

        let mut ordered: Vec<&FetchSource> = sources.iter().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

        for source in ordered {
            let fetcher_id = source.fetcher_id();

            let step = match self.scrape_source(source).await {
                Ok(step) => step,
                Err(e) if self.settings.debug && matches!(e, ScrapeError::Parse(_)) => {
                    self.release_after_error(station_id, task_id).await;
                    return Err(e);
                }
                Err(e) => {
                    warn!(station_id, fetcher_id = %fetcher_id, kind = e.kind(), error = %e, "Source failed");
                    summary.errors.push(format!("{}: {}", fetcher_id, e));
                    SourceStep::Recorded(FetcherOutcome::Failed(e.to_string()))
                }
            };

            let outcome = match step {
                SourceStep::Skipped(reason) => {
                    info!(station_id, fetcher_id = %fetcher_id, reason = %reason, "Source skipped");
                    summary.skipped.push(format!("{}: {}", fetcher_id, reason));
                    continue;
                }
                SourceStep::Recorded(outcome) => outcome,
            };
            if outcome.is_completed() {
                summary.scraped_count += 1;
            }

            let recorded = match self
                .coordinator
                .record_result(
                    station_id,
                    &fetcher_id,
                    source.priority,
                    outcome,
                    task_id,
                    source.dirty,
                )
                .await
            {
                Ok(recorded) => recorded,
                Err(ScrapeError::ConcurrencyConflict { .. }) => {
                    info!(station_id, task_id = %task_id, fetcher_id = %fetcher_id, "Task state contended, run abandoned");
                    summary.superseded = true;
                    break;
                }
                Err(e) => {
                    self.release_after_error(station_id, task_id).await;
                    return Err(e);
                }
            };

            if recorded.should_abort {
                summary.superseded = true;
                break;
            }

            summary.merged_result = recorded.merged;
            if summary
                .merged_result
                .as_ref()
                .is_some_and(StationNowPlayingData::has_complete_song)
            {
                debug!(station_id, fetcher_id = %fetcher_id, "Complete song found, stopping early");
                break;
            }
        }

        if summary.superseded {
            summary.merged_result = None;
        }
        summary.success = !summary.superseded && summary.merged_result.is_some();
        match self
            .coordinator
            .finalize(station_id, task_id, summary.success)
            .await
        {
            Ok(_) => {}
            Err(ScrapeError::ConcurrencyConflict { .. }) => {
                warn!(station_id, task_id = %task_id, "Release contended, station left to the stale window");
                summary.superseded = true;
                summary.success = false;
                summary.merged_result = None;
            }
            Err(e) => return Err(e),
        }

        info!(
            station_id,
            task_id = %task_id,
            success = summary.success,
            superseded = summary.superseded,
            scraped = summary.scraped_count,
            errors = summary.errors.len(),
            skipped = summary.skipped.len(),
            "Scrape run finished"
        );
        Ok(summary)
    }

    /// Best-effort release before an error leaves the run
    async fn release_after_error(&self, station_id: &str, task_id: Uuid) {
        if let Err(e) = self.coordinator.finalize(station_id, task_id, false).await {
            warn!(station_id, task_id = %task_id, error = %e, "Station release failed");
        }
    }

    /// Fetch and parse one source
    async fn scrape_source(&self, source: &FetchSource) -> ScrapeResult<SourceStep> {
        let scraper = self
            .registry
            .get_scraper(&source.category)
            .ok_or_else(|| ScrapeError::UnknownCategory(source.category.clone()))?;
        let plan = scraper.fetch_plan(&self.settings);

        if plan.precheck() {
            if let Some(reason) = self.precheck(scraper.as_ref(), &source.url).await {
                return Ok(SourceStep::Skipped(reason));
            }
        }

        let raw = self.fetch(&plan, &source.url).await?;
        if let Some(ct) = raw.meta.content_type() {
            if !scraper.accepts_content_type(&ct) {
                return Ok(SourceStep::Skipped(format!("content type {}", ct)));
            }
        }

        let data = scraper.parse(&raw, source)?;
        Ok(SourceStep::Recorded(FetcherOutcome::Completed(data)))
    }

    /// HEAD the URL; a skip reason when the content type is unwanted
    ///
    /// A failing HEAD is not a reason to skip, plenty of servers refuse it.
    async fn precheck(&self, scraper: &dyn Scraper, url: &str) -> Option<String> {
        match self.http.head(url, self.settings.precheck_timeout()).await {
            Ok(meta) => meta
                .content_type()
                .filter(|ct| !scraper.accepts_content_type(ct))
                .map(|ct| format!("content type {}", ct)),
            Err(e) => {
                debug!(url, error = %e, "Precheck failed, fetching anyway");
                None
            }
        }
    }

    async fn fetch(&self, plan: &FetchPlan, url: &str) -> ScrapeResult<RawContent> {
        let result = match *plan {
            FetchPlan::Document { timeout, .. } => self.http.get(url, timeout).await,
            FetchPlan::StreamPrefix { timeout, limit, .. } => {
                self.http.read_stream_prefix(url, limit, timeout).await
            }
        };
        result.map_err(|e| e.into_scrape_error(url))
    }
}
