//! Station RSS feeds
//!
//! Uses the same bounded HTTP port as the scrapers. Posts are keyed by link
//! downstream, so items without one are dropped and duplicates collapse.

use crate::error::{ScrapeError, ScrapeResult};
use crate::http::HttpFetcher;
use chrono::{DateTime, Utc};
use onair_common::RssPost;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

/// Posts of an already parsed channel, in feed order
pub fn parse_channel(channel: &rss::Channel) -> Vec<RssPost> {
    let mut seen = HashSet::new();
    channel
        .items()
        .iter()
        .filter_map(|item| {
            let link = item
                .link()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .or_else(|| {
                    item.guid()
                        .filter(|g| g.is_permalink() && !g.value().trim().is_empty())
                        .map(|g| g.value().trim().to_string())
                })?;

            let published = item
                .pub_date()
                .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
                .map(|dt| dt.with_timezone(&Utc));

            Some(RssPost {
                title: item.title().unwrap_or("(untitled)").trim().to_string(),
                link,
                description: item.description().map(String::from),
                published,
            })
        })
        .filter(|post| seen.insert(post.link.clone()))
        .collect()
}

/// Fetch and parse a feed
pub async fn fetch_posts(
    http: &dyn HttpFetcher,
    url: &str,
    timeout: Duration,
) -> ScrapeResult<Vec<RssPost>> {
    debug!(url, "Fetching RSS feed");
    let raw = http
        .get(url, timeout)
        .await
        .map_err(|e| e.into_scrape_error(url))?;

    let channel = rss::Channel::read_from(raw.body.as_slice())
        .map_err(|e| ScrapeError::Parse(format!("invalid RSS: {}", e)))?;
    let posts = parse_channel(&channel);
    info!(url, posts = posts.len(), "RSS feed parsed");
    Ok(posts)
}
