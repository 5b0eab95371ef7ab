//! Search and crawl execution with retry discipline
//!
//! Both operations absorb provider failures: once retries are exhausted
//! they log and return an empty list so the research loop keeps going.

use std::{collections::HashSet, sync::Arc};

use indexmap::IndexSet;
use tracing::{debug, instrument, warn};

use crate::providers::{CrawlOptions, CrawlProvider, SearchProvider};
use crate::retry::RetryPolicy;
use crate::types::Page;

/// Fixed keywords scored alongside the award identifier
const RELEVANCE_KEYWORDS: [&str; 4] = ["contract", "fraud", "award", "recipient"];

pub struct CrawlExecutor {
    search_provider: Arc<dyn SearchProvider>,
    crawl_provider: Arc<dyn CrawlProvider>,
    retry: RetryPolicy,
    max_pages_per_site: usize,
}

impl CrawlExecutor {
    pub fn new(
        search_provider: Arc<dyn SearchProvider>,
        crawl_provider: Arc<dyn CrawlProvider>,
        retry: RetryPolicy,
        max_pages_per_site: usize,
    ) -> Self {
        Self {
            search_provider,
            crawl_provider,
            retry,
            max_pages_per_site,
        }
    }

    /// Resolve a topic into at most `limit` URLs not yet visited in this run
    #[instrument(skip(self, visited))]
    pub async fn search(&self, query: &str, limit: usize, visited: &HashSet<String>) -> Vec<String> {
        let hits = match self
            .retry
            .run("search", || self.search_provider.search(query, limit))
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Search failed for topic {:?}: {}", query, e);
                return Vec::new();
            }
        };

        debug!("Found {} results for {:?}", hits.len(), query);

        let urls: IndexSet<String> = hits
            .into_iter()
            .map(|hit| hit.url.trim().to_string())
            .filter(|url| !url.is_empty() && !visited.contains(url))
            .collect();

        urls.into_iter().take(limit).collect()
    }

    /// Crawl a site and keep pages that plausibly concern the award
    #[instrument(skip(self))]
    pub async fn crawl(&self, url: &str, award_id: &str) -> Vec<Page> {
        let options = CrawlOptions::new(self.max_pages_per_site);
        let response = match self
            .retry
            .run("crawl", || self.crawl_provider.crawl(url, &options))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Crawl failed: {}: {}", url, e);
                return Vec::new();
            }
        };

        if !response.success {
            debug!("Crawl of {} reported no success", url);
            return Vec::new();
        }

        let total = response.pages.len();
        let pages: Vec<Page> = response
            .pages
            .into_iter()
            .filter_map(|doc| {
                let content = doc.markdown.or(doc.html).unwrap_or_default();
                if !mentions_award(&content, award_id) {
                    return None;
                }
                Some(Page {
                    url: doc.url.unwrap_or_else(|| url.to_string()),
                    title: doc.title.unwrap_or_default(),
                    relevance_score: relevance_score(&content, award_id),
                    content,
                })
            })
            .take(self.max_pages_per_site)
            .collect();

        debug!("Kept {} of {} pages from {}", pages.len(), total, url);
        pages
    }
}

/// Precision filter: the award id verbatim, or the word "contract" in any case
pub fn mentions_award(content: &str, award_id: &str) -> bool {
    (!award_id.is_empty() && content.contains(award_id))
        || content.to_lowercase().contains("contract")
}

/// Fraction of relevance keywords present, case-insensitively, capped at 1.0
pub fn relevance_score(content: &str, award_id: &str) -> f64 {
    let haystack = content.to_lowercase();
    let increment = 1.0 / (RELEVANCE_KEYWORDS.len() + 1) as f64;

    let award_hit = !award_id.is_empty() && haystack.contains(&award_id.to_lowercase());
    let hits = RELEVANCE_KEYWORDS
        .iter()
        .filter(|keyword| haystack.contains(*keyword))
        .count()
        + usize::from(award_hit);

    (hits as f64 * increment).min(1.0)
}
