use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use tracing::{info, warn};

use brandpulse_common::UrlCategory;

use super::filters::{dedup_records, usable_record};
use super::SkipReason;
use crate::traits::PostScraper;

/// The scraping backend refuses more parallel runs than this.
pub const SCRAPE_CONCURRENCY: usize = 2;

/// Output of one scrape round.
#[derive(Debug, Default)]
pub struct ScrapeBatch {
    /// Usable records, deduplicated by URL.
    pub records: Vec<Map<String, Value>>,
    /// Items returned by the oracle before any filtering.
    pub raw_count: usize,
    /// URLs whose scrape succeeded, even with zero items.
    pub answered: usize,
}

pub struct SourceScrape {
    scraper: Arc<dyn PostScraper>,
}

impl SourceScrape {
    pub fn new(scraper: Arc<dyn PostScraper>) -> Self {
        Self { scraper }
    }

    /// Fetch posts for each URL, at most `SCRAPE_CONCURRENCY` at a time. A URL
    /// that fails is logged and contributes nothing.
    pub async fn scrape(
        &self,
        urls: &[String],
        category: UrlCategory,
        max_posts_per_url: u32,
    ) -> ScrapeBatch {
        let outcomes: Vec<(String, Result<Vec<Value>, SkipReason>)> =
            stream::iter(urls.iter().cloned().map(|url| {
                let scraper = self.scraper.clone();
                async move {
                    let result = scraper
                        .scrape(std::slice::from_ref(&url), max_posts_per_url)
                        .await
                        .map_err(|e| SkipReason::OracleFailed(e.to_string()));
                    (url, result)
                }
            }))
            .buffered(SCRAPE_CONCURRENCY)
            .collect()
            .await;

        let mut raw_count = 0;
        let mut failed = 0;
        let mut records = Vec::new();
        for (url, outcome) in outcomes {
            match outcome {
                Ok(items) => {
                    raw_count += items.len();
                    records.extend(items.into_iter().filter_map(usable_record));
                }
                Err(reason) => {
                    failed += 1;
                    warn!(url = url.as_str(), %category, %reason, "Scrape failed, skipping URL");
                }
            }
        }

        let usable = records.len();
        let records = dedup_records(records);
        info!(
            %category,
            urls = urls.len(),
            failed,
            raw_count,
            usable,
            unique = records.len(),
            limit = max_posts_per_url,
            "Scrape round complete"
        );

        ScrapeBatch {
            records,
            raw_count,
            answered: urls.len() - failed,
        }
    }
}
