//! Category identifier to strategy lookup
//!
//! Built once at startup and injected into the orchestrator. Registration
//! stays possible while the registry is shared, so new formats plug in
//! without touching the orchestrator.

use super::icecast::IcecastJsonScraper;
use super::legacy_html::{HtmlFlavor, LegacyHtmlScraper};
use super::radio_co::RadioCoScraper;
use super::shoutcast::{ShoutcastJsonScraper, ShoutcastXmlScraper};
use super::stream_id3::StreamId3Scraper;
use super::vendor::{VendorJsonScraper, BUILTIN_PROFILES};
use super::Scraper;
use crate::normalizer::Normalizer;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

pub struct ScraperRegistry {
    scrapers: RwLock<HashMap<String, Arc<dyn Scraper>>>,
}

impl ScraperRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            scrapers: RwLock::new(HashMap::new()),
        }
    }

    /// Registry holding every built-in strategy
    pub fn with_defaults(normalizer: Arc<Normalizer>) -> Self {
        let registry = Self::new();
        registry.register(Arc::new(ShoutcastJsonScraper::new(normalizer.clone())));
        registry.register(Arc::new(ShoutcastXmlScraper::new(normalizer.clone())));
        registry.register(Arc::new(IcecastJsonScraper::new(normalizer.clone())));
        registry.register(Arc::new(RadioCoScraper::new(normalizer.clone())));
        registry.register(Arc::new(LegacyHtmlScraper::new(
            HtmlFlavor::Icecast,
            normalizer.clone(),
        )));
        registry.register(Arc::new(LegacyHtmlScraper::new(
            HtmlFlavor::Shoutcast,
            normalizer.clone(),
        )));
        for profile in BUILTIN_PROFILES {
            registry.register(Arc::new(VendorJsonScraper::new(*profile, normalizer.clone())));
        }
        registry.register(Arc::new(StreamId3Scraper::new(normalizer)));
        registry
    }

    /// Register a strategy under its category, replacing any previous one
    pub fn register(&self, scraper: Arc<dyn Scraper>) {
        let category = scraper.category().to_string();
        let mut scrapers = self
            .scrapers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if scrapers.insert(category.clone(), scraper).is_some() {
            warn!(category = %category, "Scraper replaced");
        } else {
            debug!(category = %category, "Scraper registered");
        }
    }

    /// Strategy for a category, `None` when unknown
    pub fn get_scraper(&self, category: &str) -> Option<Arc<dyn Scraper>> {
        self.scrapers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(category)
            .cloned()
    }

    /// Registered categories, sorted
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self
            .scrapers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        categories.sort();
        categories
    }
}

impl Default for ScraperRegistry {
    fn default() -> Self {
        Self::new()
    }
}
