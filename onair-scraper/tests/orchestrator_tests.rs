//! Scrape cycle scenarios against scripted upstreams

mod common_support;

use common_support::{Reply, ScriptedHttp};
use onair_common::{FetchSource, TaskState};
use onair_scraper::config::ScraperSettings;
use onair_scraper::coordinator::{InMemoryTaskStateStore, TaskStateCoordinator, TaskStateStore};
use onair_scraper::error::NetworkErrorKind;
use onair_scraper::http::{FetchError, HttpFetcher, PrefixLimit, RawContent, ResponseMeta};
use onair_scraper::normalizer::Normalizer;
use onair_scraper::{FetchOrchestrator, ScraperRegistry};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const STATION: &str = "radio-test";
const A_URL: &str = "http://a.example/stats?json=1";
const B_URL: &str = "http://b.example/stats?json=1";

struct Harness {
    http: Arc<ScriptedHttp>,
    store: Arc<InMemoryTaskStateStore>,
    orchestrator: FetchOrchestrator,
}

fn harness(http: ScriptedHttp, settings: ScraperSettings) -> Harness {
    let http = Arc::new(http);
    let store = Arc::new(InMemoryTaskStateStore::new());
    let coordinator = Arc::new(TaskStateCoordinator::new(
        store.clone(),
        settings.stale_task_after(),
    ));
    let registry = Arc::new(ScraperRegistry::with_defaults(Arc::new(Normalizer::default())));
    let orchestrator = FetchOrchestrator::new(registry, coordinator, http.clone(), settings);
    Harness {
        http,
        store,
        orchestrator,
    }
}

fn shoutcast(url: &str, priority: i32) -> FetchSource {
    FetchSource::new("shoutcast-json", url, priority)
}

#[tokio::test]
async fn test_early_exit_skips_lower_priority_sources() {
    let http = ScriptedHttp::new()
        .with(A_URL, Reply::json(r#"{"songtitle":"Daft Punk - One More Time"}"#))
        .with(B_URL, Reply::json(r#"{"songtitle":"Other - Song","currentlisteners":99}"#));
    let h = harness(http, ScraperSettings::default());

    // Given out of order on purpose
    let sources = vec![shoutcast(B_URL, 5), shoutcast(A_URL, 10)];
    let summary = h.orchestrator.run(STATION, &sources).await.unwrap();

    assert!(summary.success);
    assert_eq!(summary.scraped_count, 1);
    assert_eq!(h.http.fetch_count(), 1);
    assert!(h.http.calls_to(B_URL).is_empty());

    let merged = summary.merged_result.unwrap();
    assert_eq!(merged.song_artist(), Some("Daft Punk"));
    assert_eq!(merged.song_name(), Some("One More Time"));
    assert_eq!(merged.listeners, None);
}

#[tokio::test]
async fn test_lower_priority_fills_missing_song() {
    let http = ScriptedHttp::new()
        .with(A_URL, Reply::json(r#"{"currentlisteners":42}"#))
        .with(B_URL, Reply::json(r#"{"songtitle":"Moderat - Bad Kingdom"}"#));
    let h = harness(http, ScraperSettings::default());

    let summary = h
        .orchestrator
        .run(STATION, &[shoutcast(A_URL, 10), shoutcast(B_URL, 5)])
        .await
        .unwrap();

    assert!(summary.success);
    assert_eq!(summary.scraped_count, 2);
    let merged = summary.merged_result.unwrap();
    assert_eq!(merged.listeners, Some(42));
    assert_eq!(merged.song_name(), Some("Bad Kingdom"));
    assert_eq!(merged.song_artist(), Some("Moderat"));
    assert_eq!(merged.raw_data.len(), 2);
}

#[tokio::test]
async fn test_malformed_json_is_recorded_and_run_continues() {
    let http = ScriptedHttp::new()
        .with(A_URL, Reply::json(r#"{"songtitle": "broken"#))
        .with(B_URL, Reply::json(r#"{"songtitle":"Burial - Archangel","currentlisteners":"3"}"#));
    let h = harness(http, ScraperSettings::default());

    let summary = h
        .orchestrator
        .run(STATION, &[shoutcast(A_URL, 10), shoutcast(B_URL, 5)])
        .await
        .unwrap();

    assert!(summary.success);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].contains("parse error"), "{:?}", summary.errors);
    assert!(summary.errors[0].starts_with(&format!("shoutcast-json@{}", A_URL)));
    assert_eq!(summary.merged_result.unwrap().song_artist(), Some("Burial"));

    let state = h.store.load(STATION).await.unwrap().unwrap();
    let failed = &state.processed_fetcher_states[&format!("shoutcast-json@{}", A_URL)];
    assert!(!failed.outcome.is_completed());
}

#[tokio::test]
async fn test_debug_mode_reraises_parse_errors() {
    let http = ScriptedHttp::new().with(A_URL, Reply::json("not json"));
    let settings = ScraperSettings {
        debug: true,
        ..ScraperSettings::default()
    };
    let h = harness(http, settings);

    let err = h
        .orchestrator
        .run(STATION, &[shoutcast(A_URL, 10)])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "parse");

    // Station released for the next run
    let state = h.store.load(STATION).await.unwrap().unwrap();
    assert_eq!(state.current_task_id, None);
}

#[tokio::test]
async fn test_stream_id3_skips_html_before_parsing() {
    let stream_url = "http://stream.example/live";
    let http = ScriptedHttp::new().with(
        stream_url,
        Reply::typed("text/html; charset=utf-8", b"<html>player page</html>"),
    );
    let h = harness(http, ScraperSettings::default());

    let summary = h
        .orchestrator
        .run(STATION, &[FetchSource::new("stream-id3", stream_url, 1)])
        .await
        .unwrap();

    assert!(summary.errors.is_empty());
    assert_eq!(summary.skipped.len(), 1);
    assert!(summary.skipped[0].contains("text/html"));
    assert_eq!(summary.scraped_count, 0);
    assert!(!summary.success);
    // Only the HEAD precheck went out
    assert_eq!(h.http.calls_to(stream_url), vec!["HEAD"]);
}

#[tokio::test]
async fn test_html_status_page_on_audio_mount_is_skipped() {
    let url = "http://ice.example/live";
    let http = ScriptedHttp::new().with(url, Reply::typed("audio/mpeg", &[0xff, 0xfb, 0x90]));
    let h = harness(http, ScraperSettings::default());

    let summary = h
        .orchestrator
        .run(STATION, &[FetchSource::new("icecast-html", url, 1)])
        .await
        .unwrap();

    assert_eq!(summary.skipped.len(), 1);
    assert!(summary.errors.is_empty());
}

#[tokio::test]
async fn test_unknown_category_and_network_errors_do_not_abort() {
    let http = ScriptedHttp::new()
        .with(A_URL, Reply::Fail(NetworkErrorKind::Timeout))
        .with(B_URL, Reply::json(r#"{"songtitle":"Caribou - Sun","currentlisteners":1}"#));
    let h = harness(http, ScraperSettings::default());

    let sources = vec![
        FetchSource::new("gopher-json", "gopher://x.example", 20),
        shoutcast(A_URL, 10),
        shoutcast(B_URL, 5),
    ];
    let summary = h.orchestrator.run(STATION, &sources).await.unwrap();

    assert!(summary.success);
    assert_eq!(summary.errors.len(), 2);
    assert!(summary.errors[0].contains("no scraper for category 'gopher-json'"));
    assert!(summary.errors[1].contains("timeout"));
    assert_eq!(summary.merged_result.unwrap().song_name(), Some("Sun"));
}

#[tokio::test]
async fn test_all_sources_failing_is_no_data() {
    let http = ScriptedHttp::new().with(A_URL, Reply::Fail(NetworkErrorKind::Status(503)));
    let h = harness(http, ScraperSettings::default());

    let summary = h
        .orchestrator
        .run(STATION, &[shoutcast(A_URL, 10)])
        .await
        .unwrap();

    assert!(!summary.success);
    assert!(summary.merged_result.is_none());
    assert_eq!(summary.errors.len(), 1);

    let state = h.store.load(STATION).await.unwrap().unwrap();
    assert_eq!(state.current_task_id, None);
    assert_eq!(state.last_successful_task_id, None);
}

#[tokio::test]
async fn test_busy_station_is_not_touched() {
    let http = ScriptedHttp::new().with(A_URL, Reply::json(r#"{"songtitle":"A - B"}"#));
    let h = harness(http, ScraperSettings::default());

    let owner = Uuid::new_v4();
    let mut state = TaskState::new(STATION);
    state.current_task_id = Some(owner);
    state.current_task_started_at = Some(chrono::Utc::now());
    state.version = 7;
    h.store.put(state.clone()).await;

    let summary = h
        .orchestrator
        .run(STATION, &[shoutcast(A_URL, 10)])
        .await
        .unwrap();

    assert!(summary.superseded);
    assert!(!summary.success);
    assert_eq!(h.http.fetch_count(), 0);
    assert_eq!(h.store.load(STATION).await.unwrap().unwrap(), state);
}

#[tokio::test]
async fn test_successful_run_releases_station() {
    let http = ScriptedHttp::new().with(A_URL, Reply::json(r#"{"songtitle":"Aphex Twin - Xtal"}"#));
    let h = harness(http, ScraperSettings::default());

    let summary = h
        .orchestrator
        .run(STATION, &[shoutcast(A_URL, 10)])
        .await
        .unwrap();

    let state = h.store.load(STATION).await.unwrap().unwrap();
    assert_eq!(state.current_task_id, None);
    assert_eq!(state.last_successful_task_id, Some(summary.task_id));
}

/// Hands the station to another task while the first fetch is in flight
struct TakeoverDuringFetch {
    inner: ScriptedHttp,
    store: Arc<InMemoryTaskStateStore>,
}

#[async_trait::async_trait]
impl HttpFetcher for TakeoverDuringFetch {
    async fn head(&self, url: &str, timeout: Duration) -> Result<ResponseMeta, FetchError> {
        self.inner.head(url, timeout).await
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<RawContent, FetchError> {
        if let Some(mut state) = self.store.load(STATION).await.unwrap() {
            state.current_task_id = Some(Uuid::new_v4());
            state.version += 1;
            self.store.put(state).await;
        }
        self.inner.get(url, timeout).await
    }

    async fn read_stream_prefix(
        &self,
        url: &str,
        limit: PrefixLimit,
        timeout: Duration,
    ) -> Result<RawContent, FetchError> {
        self.inner.read_stream_prefix(url, limit, timeout).await
    }
}

#[tokio::test]
async fn test_superseded_mid_run_stops_without_more_fetches() {
    let store = Arc::new(InMemoryTaskStateStore::new());
    let http = Arc::new(TakeoverDuringFetch {
        inner: ScriptedHttp::new()
            .with(A_URL, Reply::json(r#"{"currentlisteners":1}"#))
            .with(B_URL, Reply::json(r#"{"songtitle":"X - Y"}"#)),
        store: store.clone(),
    });
    let settings = ScraperSettings::default();
    let coordinator = Arc::new(TaskStateCoordinator::new(store.clone(), settings.stale_task_after()));
    let registry = Arc::new(ScraperRegistry::with_defaults(Arc::new(Normalizer::default())));
    let orchestrator = FetchOrchestrator::new(registry, coordinator, http.clone(), settings);

    let summary = orchestrator
        .run(STATION, &[shoutcast(A_URL, 10), shoutcast(B_URL, 5)])
        .await
        .unwrap();

    assert!(summary.superseded);
    assert!(!summary.success);
    assert!(summary.merged_result.is_none());
    assert_eq!(http.inner.fetch_count(), 1);

    // Nothing written by the superseded task
    let state = store.load(STATION).await.unwrap().unwrap();
    assert!(state.processed_fetcher_states.is_empty());
    assert_ne!(state.current_task_id, Some(summary.task_id));
}

/// In-memory store whose chosen swap calls (counted from 1) lose or fail
struct ContendedStore {
    inner: InMemoryTaskStateStore,
    swaps: AtomicUsize,
    losing: RangeInclusive<usize>,
    failing: Option<usize>,
}

impl ContendedStore {
    fn losing(losing: RangeInclusive<usize>) -> Self {
        Self {
            inner: InMemoryTaskStateStore::new(),
            swaps: AtomicUsize::new(0),
            losing,
            failing: None,
        }
    }

    fn failing_at(call: usize) -> Self {
        Self {
            failing: Some(call),
            ..Self::losing(0..=0)
        }
    }
}

#[async_trait::async_trait]
impl TaskStateStore for ContendedStore {
    async fn load(&self, station_id: &str) -> onair_common::Result<Option<TaskState>> {
        self.inner.load(station_id).await
    }

    async fn compare_and_swap(
        &self,
        expected_version: Option<i64>,
        state: &TaskState,
    ) -> onair_common::Result<bool> {
        let call = self.swaps.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing == Some(call) {
            return Err(onair_common::Error::Internal("store unavailable".to_string()));
        }
        if self.losing.contains(&call) {
            return Ok(false);
        }
        self.inner.compare_and_swap(expected_version, state).await
    }
}

fn orchestrator_over(store: Arc<ContendedStore>, http: Arc<ScriptedHttp>) -> FetchOrchestrator {
    let settings = ScraperSettings::default();
    let coordinator = Arc::new(TaskStateCoordinator::new(store, settings.stale_task_after()));
    let registry = Arc::new(ScraperRegistry::with_defaults(Arc::new(Normalizer::default())));
    FetchOrchestrator::new(registry, coordinator, http, settings)
}

fn two_sources_http() -> Arc<ScriptedHttp> {
    Arc::new(
        ScriptedHttp::new()
            .with(A_URL, Reply::json(r#"{"currentlisteners":3}"#))
            .with(B_URL, Reply::json(r#"{"songtitle":"X - Y"}"#)),
    )
}

#[tokio::test]
async fn test_contended_record_abandons_run_and_releases_station() {
    // Swap 1 claims the station, swaps 2-6 exhaust the record retries
    let store = Arc::new(ContendedStore::losing(2..=6));
    let http = two_sources_http();
    let orchestrator = orchestrator_over(store.clone(), http.clone());

    let summary = orchestrator
        .run(STATION, &[shoutcast(A_URL, 10), shoutcast(B_URL, 5)])
        .await
        .unwrap();

    assert!(summary.superseded);
    assert!(!summary.success);
    assert!(summary.merged_result.is_none());
    assert_eq!(http.fetch_count(), 1);

    let state = store.load(STATION).await.unwrap().unwrap();
    assert_eq!(state.current_task_id, None);
    assert!(state.processed_fetcher_states.is_empty());
}

#[tokio::test]
async fn test_contended_initialize_skips_run() {
    let store = Arc::new(ContendedStore::losing(1..=usize::MAX));
    let http = two_sources_http();
    let orchestrator = orchestrator_over(store.clone(), http.clone());

    let summary = orchestrator.run(STATION, &[shoutcast(A_URL, 10)]).await.unwrap();

    assert!(summary.superseded);
    assert!(!summary.success);
    assert_eq!(http.fetch_count(), 0);
    assert!(store.load(STATION).await.unwrap().is_none());
}

#[tokio::test]
async fn test_store_failure_mid_run_releases_station() {
    let store = Arc::new(ContendedStore::failing_at(2));
    let http = two_sources_http();
    let orchestrator = orchestrator_over(store.clone(), http.clone());

    let err = orchestrator
        .run(STATION, &[shoutcast(A_URL, 10), shoutcast(B_URL, 5)])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "store");
    assert_eq!(http.fetch_count(), 1);
    let state = store.load(STATION).await.unwrap().unwrap();
    assert_eq!(state.current_task_id, None);
}
