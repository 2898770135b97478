//! # onair Common Library
//!
//! Shared code for the onair scraping services including:
//! - Value types exchanged between scrapers, coordinator and persistence
//! - Common error type
//! - Bootstrap configuration loading
//! - Time and UUID helpers

pub mod config;
pub mod error;
pub mod models;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
pub use models::{
    is_blank, FetchSource, FetcherEntry, FetcherOutcome, RssPost, SongData, StationNowPlayingData,
    StationUptimeData, TaskState, DEFAULT_SPLIT_CHARACTER,
};
