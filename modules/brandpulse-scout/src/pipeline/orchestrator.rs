//! Top-level collection: queries → search → per-category widening fetch →
//! merge, dedup and truncate.

use std::sync::Arc;

use ai_client::TextModel;
use anyhow::Result;
use tracing::{info, warn};

use brandpulse_common::{DateRange, Post, UrlCategory};

use super::filters::dedup_by_url;
use super::queries::QueryGenerator;
use super::scrape::SourceScrape;
use super::search::SourceSearch;
use super::stats::{CategoryStats, ScrapeStats};
use super::verifier::RelevanceVerifier;
use super::widening::{fetch_until_target, Relevance, WideningParams, DEFAULT_MULTIPLIER};
use crate::traits::{PostScraper, ProgressSink, WebSearcher};

pub const DEFAULT_TARGET: usize = 20;
pub const DEFAULT_MAX_LIMIT: u32 = 100;

/// How one URL category is fetched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryPlan {
    pub category: UrlCategory,
    /// Only the first this-many URLs of the category are scraped.
    pub max_urls: usize,
    /// Starting per-URL limit for the widening loop.
    pub posts_per_url: u32,
    /// Progress reported when the category starts.
    pub progress: f64,
}

/// Fetch order and budgets. Earlier categories win the truncated slots.
pub const CATEGORY_PLAN: [CategoryPlan; 4] = [
    CategoryPlan { category: UrlCategory::Mentions, max_urls: 10, posts_per_url: 1, progress: 0.3 },
    CategoryPlan { category: UrlCategory::Groups, max_urls: 5, posts_per_url: 15, progress: 0.5 },
    CategoryPlan { category: UrlCategory::Events, max_urls: 5, posts_per_url: 10, progress: 0.7 },
    CategoryPlan { category: UrlCategory::Pages, max_urls: 5, posts_per_url: 10, progress: 0.8 },
];

pub const PROGRESS_QUERIES: f64 = 0.1;
pub const PROGRESS_SEARCH: f64 = 0.2;

pub struct ScrapingOrchestrator {
    queries: QueryGenerator,
    search: SourceSearch,
    scrape: SourceScrape,
    verifier: Option<RelevanceVerifier>,
    target: usize,
    max_limit: u32,
    multiplier: f64,
}

impl ScrapingOrchestrator {
    pub fn new(
        query_model: Arc<dyn TextModel>,
        searcher: Arc<dyn WebSearcher>,
        scraper: Arc<dyn PostScraper>,
    ) -> Self {
        Self {
            queries: QueryGenerator::new(query_model),
            search: SourceSearch::new(searcher),
            scrape: SourceScrape::new(scraper),
            verifier: None,
            target: DEFAULT_TARGET,
            max_limit: DEFAULT_MAX_LIMIT,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }

    pub fn with_verifier(mut self, verifier: RelevanceVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_target(mut self, target: usize) -> Self {
        self.target = target;
        self
    }

    pub fn with_max_limit(mut self, max_limit: u32) -> Self {
        self.max_limit = max_limit;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Collect up to `target` posts about `brand`. Finding no source URLs is
    /// not an error; it yields an empty list.
    pub async fn run(
        &self,
        brand: &str,
        date_range: Option<&DateRange>,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<Post>> {
        let date_range = date_range.copied().unwrap_or_default();
        let mut stats = ScrapeStats::default();
        info!(brand, range = %date_range.describe(), target = self.target, "Scraping run starting");

        progress.report("Generating search queries", PROGRESS_QUERIES).await;
        let queries = self.queries.generate(brand).await;
        stats.queries = queries.len();

        progress.report("Searching for sources", PROGRESS_SEARCH).await;
        let found = self.search.search(brand, &queries).await;
        stats.urls_found = found.total();
        if found.is_empty() {
            warn!(brand, "No source URLs found");
            info!("{stats}");
            return Ok(Vec::new());
        }

        let relevance = self.verifier.as_ref().map(|verifier| Relevance { verifier, brand });
        let mut collected: Vec<Post> = Vec::new();

        for plan in CATEGORY_PLAN {
            let urls: Vec<String> = found
                .get(plan.category)
                .iter()
                .take(plan.max_urls)
                .cloned()
                .collect();
            progress
                .report(&format!("Fetching {} ({} sources)", plan.category, urls.len()), plan.progress)
                .await;

            let mut category_stats = CategoryStats {
                category: plan.category,
                urls: urls.len(),
                accepted: 0,
                rounds: 0,
                rejected_by_date: 0,
                rejected_by_verifier: 0,
                stop: None,
            };
            if collected.len() >= self.target || urls.is_empty() {
                stats.categories.push(category_stats);
                continue;
            }

            let params = WideningParams::new(self.target - collected.len(), plan.posts_per_url, self.max_limit)
                .with_multiplier(self.multiplier);
            let outcome =
                fetch_until_target(&self.scrape, &urls, plan.category, &date_range, params, relevance).await;

            category_stats.accepted = outcome.posts.len();
            category_stats.rounds = outcome.rounds;
            category_stats.rejected_by_date = outcome.rejected_by_date;
            category_stats.rejected_by_verifier = outcome.rejected_by_verifier;
            category_stats.stop = Some(outcome.stop);
            stats.categories.push(category_stats);

            collected.extend(outcome.posts);
            collected = dedup_by_url(collected);
        }

        let mut posts = dedup_by_url(collected);
        posts.truncate(self.target);
        stats.posts_collected = posts.len();
        info!("{stats}");

        Ok(posts)
    }
}
