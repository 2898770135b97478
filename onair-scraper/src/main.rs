//! onair-scraper - station metadata, uptime and RSS jobs
//!
//! One invocation runs one job kind for every configured station (or a
//! single one with `--station`). Stations run in parallel; scheduling is
//! left to cron or a similar external timer.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use onair_common::config::{self as common_config, LoggingConfig, ROOT_FOLDER_ENV};
use onair_scraper::config::{ServiceConfig, StationConfig};
use onair_scraper::coordinator::TaskStateCoordinator;
use onair_scraper::db::{self, SqliteResultSink, SqliteTaskStateStore};
use onair_scraper::http::{HttpFetcher, ReqwestFetcher};
use onair_scraper::jobs::JobRunner;
use onair_scraper::normalizer::Normalizer;
use onair_scraper::uptime::UptimeProber;
use onair_scraper::{FetchOrchestrator, ScraperRegistry};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for onair-scraper
#[derive(Parser, Debug)]
#[command(name = "onair-scraper")]
#[command(about = "Now-playing scraper for radio stations")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "ONAIR_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database
    #[arg(short, long, env = ROOT_FOLDER_ENV)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape now-playing metadata
    Scrape {
        /// Only this station
        #[arg(long)]
        station: Option<String>,
    },
    /// Probe live stream availability
    Uptime {
        #[arg(long)]
        station: Option<String>,
    },
    /// Fetch station RSS feeds
    Rss {
        #[arg(long)]
        station: Option<String>,
    },
    /// List registered scraper categories
    Categories,
}

#[derive(Debug, Clone, Copy)]
enum JobKind {
    Scrape,
    Uptime,
    Rss,
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("onair_scraper={0},onair_common={0}", logging.level).into());

    match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
    Ok(())
}

fn select_stations(config: &ServiceConfig, only: Option<&str>) -> Result<Vec<StationConfig>> {
    match only {
        Some(id) => config
            .station(id)
            .cloned()
            .map(|s| vec![s])
            .with_context(|| format!("Unknown station '{}'", id)),
        None => Ok(config.stations.clone()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(common_config::default_config_path);
    let toml_config = common_config::load_toml_config(&config_path)?;
    init_tracing(&toml_config.logging)?;

    let service_config = ServiceConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let settings = service_config.scraper.clone();

    let normalizer = Arc::new(Normalizer::new(&settings.cleaner));
    let registry = Arc::new(ScraperRegistry::with_defaults(normalizer));

    let (kind, only) = match &args.command {
        Command::Categories => {
            for category in registry.categories() {
                println!("{}", category);
            }
            return Ok(());
        }
        Command::Scrape { station } => (JobKind::Scrape, station.as_deref()),
        Command::Uptime { station } => (JobKind::Uptime, station.as_deref()),
        Command::Rss { station } => (JobKind::Rss, station.as_deref()),
    };

    info!("Starting onair-scraper {}", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", config_path.display());

    let root_folder =
        common_config::resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, &toml_config);
    let db_path = toml_config.database_path(&root_folder);
    info!("Database: {}", db_path.display());
    let pool = db::init_database_pool(&db_path).await?;

    let http: Arc<dyn HttpFetcher> = Arc::new(
        ReqwestFetcher::new(settings.user_agent.clone())
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?,
    );
    let coordinator = Arc::new(TaskStateCoordinator::new(
        Arc::new(SqliteTaskStateStore::new(pool.clone())),
        settings.stale_task_after(),
    ));
    let orchestrator = Arc::new(FetchOrchestrator::new(
        registry,
        coordinator,
        http.clone(),
        settings.clone(),
    ));
    let prober = Arc::new(UptimeProber::new(http.clone(), &settings));
    let runner = JobRunner::new(
        orchestrator,
        prober,
        http,
        Arc::new(SqliteResultSink::new(pool)),
        settings,
    );

    let stations = select_stations(&service_config, only)?;
    if stations.is_empty() {
        warn!("No stations configured");
        return Ok(());
    }
    info!(stations = stations.len(), job = ?kind, "Running jobs");

    let mut jobs = JoinSet::new();
    for station in stations {
        let runner = runner.clone();
        jobs.spawn(async move {
            let outcome = match kind {
                JobKind::Scrape => runner.scrape(&station).await.map(|summary| {
                    format!(
                        "success={} superseded={} scraped={} errors={}",
                        summary.success,
                        summary.superseded,
                        summary.scraped_count,
                        summary.errors.len()
                    )
                }),
                JobKind::Uptime => runner.uptime(&station).await.map(|data| match data {
                    Some(d) => format!("is_up={} latency_ms={}", d.is_up, d.latency_ms),
                    None => "no stream url".to_string(),
                }),
                JobKind::Rss => runner.rss(&station).await.map(|written| match written {
                    Some(n) => format!("posts={}", n),
                    None => "no rss url".to_string(),
                }),
            };
            (station.id, outcome)
        });
    }

    let mut failures = 0usize;
    while let Some(joined) = jobs.join_next().await {
        match joined {
            Ok((station_id, Ok(report))) => info!(station_id = %station_id, "{}", report),
            Ok((station_id, Err(e))) => {
                failures += 1;
                error!(station_id = %station_id, kind = e.kind(), error = %e, "Job failed");
            }
            Err(e) => {
                failures += 1;
                error!(error = %e, "Job panicked");
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} station job(s) failed", failures);
    }
    info!("All jobs finished");
    Ok(())
}
