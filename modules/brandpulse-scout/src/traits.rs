// Trait seams between the pipeline and the outside world.
//
// WebSearcher and PostScraper front the Apify actors; ProgressSink is how a
// running pipeline reports progress and checkpoints partial results. All of
// them have in-memory doubles in `testing.rs`, so the pipeline runs in tests
// with no network.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use apify_client::ApifyClient;
use brandpulse_common::ClassificationMap;

// ---------------------------------------------------------------------------
// Oracles
// ---------------------------------------------------------------------------

/// Web search restricted by the caller's query text.
///
/// Records are returned untyped. Shapes differ between backends and are
/// sorted out by the search stage.
#[async_trait]
pub trait WebSearcher: Send + Sync {
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<Value>>;
}

/// Fetch posts from a set of source URLs.
#[async_trait]
pub trait PostScraper: Send + Sync {
    async fn scrape(&self, urls: &[String], max_posts_per_url: u32) -> Result<Vec<Value>>;
}

#[async_trait]
impl WebSearcher for ApifyClient {
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<Value>> {
        Ok(self.run_google_search(query, max_results).await?)
    }
}

#[async_trait]
impl PostScraper for ApifyClient {
    async fn scrape(&self, urls: &[String], max_posts_per_url: u32) -> Result<Vec<Value>> {
        Ok(self.run_facebook_scraper(urls, max_posts_per_url).await?)
    }
}

// ---------------------------------------------------------------------------
// ProgressSink
// ---------------------------------------------------------------------------

/// Receives progress from a running pipeline.
///
/// Calls are awaited in-line, so a sink that persists the job finishes its
/// write before the pipeline moves on. Sinks log their own storage failures
/// rather than surfacing them; a progress write never aborts a run.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Record a named step. `fraction` is in [0, 1].
    async fn report(&self, step: &str, fraction: f64);

    /// Record partial classification results. `durable` asks for a write to
    /// long-term storage in addition to the working copy.
    async fn checkpoint_classifications(&self, _results: &ClassificationMap, _durable: bool) {}
}

/// Discards everything. For callers that do not track progress.
pub struct NoopProgress;

#[async_trait]
impl ProgressSink for NoopProgress {
    async fn report(&self, _step: &str, _fraction: f64) {}
}
