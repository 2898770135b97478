//! onair-scraper library
//!
//! Now-playing scraping engine for radio stations:
//! - `scrapers`: one strategy per upstream format, looked up through a registry
//! - `normalizer`: raw title cleanup and song/artist splitting
//! - `coordinator`: per-station task ownership and the priority merge
//! - `orchestrator`: the per-station scrape cycle
//! - `uptime`: live stream availability probe
//! - `rss`: station feed posts
//! - `jobs` and `db`: job glue and SQLite persistence

pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod http;
pub mod jobs;
pub mod normalizer;
pub mod orchestrator;
pub mod rss;
pub mod scrapers;
pub mod uptime;
pub mod utils;

pub use crate::error::{ScrapeError, ScrapeResult};
pub use crate::orchestrator::{FetchOrchestrator, ScrapeSummary};
pub use crate::scrapers::ScraperRegistry;
