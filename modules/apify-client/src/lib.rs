pub mod error;
pub mod types;

pub use error::{ApifyError, Result};
pub use types::{
    FacebookScraperInput, GoogleSearchInput, RunData, RunStatus, StartUrl,
};

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use types::ApiResponse;

const BASE_URL: &str = "https://api.apify.com/v2";

/// Actor ID for apify/google-search-scraper.
const GOOGLE_SEARCH_SCRAPER: &str = "nFJndFXA5zjCTuudP";

/// Actor ID for apify/facebook-posts-scraper.
const FACEBOOK_POSTS_SCRAPER: &str = "KoJrdxJCTtpon81KY";

/// Interval between run-status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Ceiling on how long a single run may take before we give up on it.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(300);

pub struct ApifyClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
    poll_interval: Duration,
    max_wait: Duration,
}

impl ApifyClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: BASE_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Start an actor run. Returns immediately with run metadata.
    pub async fn start_run<I: Serialize + ?Sized>(&self, actor_id: &str, input: &I) -> Result<RunData> {
        let url = format!("{}/acts/{}/runs", self.base_url, actor_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let api_resp: ApiResponse<RunData> = resp.json().await?;
        Ok(api_resp.data)
    }

    /// Fetch the current state of a run.
    pub async fn get_run(&self, run_id: &str) -> Result<RunData> {
        let url = format!("{}/actor-runs/{}", self.base_url, run_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let api_resp: ApiResponse<RunData> = resp.json().await?;
        Ok(api_resp.data)
    }

    /// Poll every `poll_interval` until the run reaches a terminal state or
    /// `max_wait` elapses.
    pub async fn wait_for_run(&self, run_id: &str) -> Result<RunData> {
        let mut waited = Duration::ZERO;
        loop {
            let run = self.get_run(run_id).await?;
            match run.run_status() {
                RunStatus::Succeeded => return Ok(run),
                status if status.is_terminal() => {
                    tracing::info!(run_id, status = %run.status, "Run finished unsuccessfully");
                    return Err(ApifyError::RunFailed(run.status));
                }
                _ => {
                    tracing::debug!(run_id, status = %run.status, "Run still in progress");
                }
            }

            if waited >= self.max_wait {
                return Err(ApifyError::Timeout {
                    run_id: run_id.to_string(),
                    waited_secs: waited.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
            waited += self.poll_interval;
        }
    }

    /// Fetch dataset items from a completed run.
    pub async fn get_dataset_items<T: DeserializeOwned>(&self, dataset_id: &str) -> Result<Vec<T>> {
        let url = format!("{}/datasets/{}/items?format=json", self.base_url, dataset_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let items: Vec<T> = resp.json().await?;
        Ok(items)
    }

    /// Start a run, wait for it, and fetch its dataset as untyped records.
    ///
    /// A run that fails, is aborted, or outlives `max_wait` yields no items
    /// rather than an error. Transport and API errors still propagate.
    pub async fn run_to_items<I: Serialize + ?Sized>(&self, actor_id: &str, input: &I) -> Result<Vec<Value>> {
        let run = self.start_run(actor_id, input).await?;
        tracing::info!(actor_id, run_id = %run.id, "Apify run started, polling for completion");

        let completed = match self.wait_for_run(&run.id).await {
            Ok(completed) => completed,
            Err(e @ (ApifyError::RunFailed(_) | ApifyError::Timeout { .. })) => {
                tracing::warn!(actor_id, run_id = %run.id, error = %e, "Apify run produced no results");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        tracing::info!(
            run_id = %completed.id,
            dataset_id = %completed.default_dataset_id,
            "Run completed, fetching results"
        );

        if completed.default_dataset_id.is_empty() {
            return Ok(Vec::new());
        }
        self.get_dataset_items(&completed.default_dataset_id).await
    }

    /// Run a single Google search query end-to-end.
    ///
    /// Records come back in whatever shape the actor emits: either flat
    /// `{url|link}` rows or page rows wrapping an `organicResults` list.
    pub async fn run_google_search(&self, query: &str, max_results: u32) -> Result<Vec<Value>> {
        tracing::info!(query, max_results, "Starting Google search run");

        let input = GoogleSearchInput {
            queries: query.to_string(),
            results_per_page: max_results,
            max_pages_per_query: 1,
        };
        let items = self.run_to_items(GOOGLE_SEARCH_SCRAPER, &input).await?;
        tracing::info!(query, count = items.len(), "Fetched search records");

        Ok(items)
    }

    /// Scrape Facebook posts for a set of URLs end-to-end: start run, poll, fetch results.
    pub async fn run_facebook_scraper(&self, urls: &[String], max_posts: u32) -> Result<Vec<Value>> {
        tracing::info!(urls = urls.len(), max_posts, "Starting Facebook posts scrape");

        let input = FacebookScraperInput {
            start_urls: urls
                .iter()
                .map(|url| StartUrl { url: url.clone() })
                .collect(),
            results_limit: max_posts,
        };
        let items = self.run_to_items(FACEBOOK_POSTS_SCRAPER, &input).await?;
        tracing::info!(count = items.len(), "Fetched Facebook posts");

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_poll_contract() {
        let client = ApifyClient::new("token".into());
        assert_eq!(client.poll_interval, Duration::from_secs(5));
        assert_eq!(client.max_wait, Duration::from_secs(300));
    }

    #[test]
    fn builder_overrides_wait_settings() {
        let client = ApifyClient::new("token".into())
            .with_max_wait(Duration::from_secs(60))
            .with_poll_interval(Duration::from_millis(10))
            .with_base_url("http://localhost:1234");
        assert_eq!(client.max_wait, Duration::from_secs(60));
        assert_eq!(client.poll_interval, Duration::from_millis(10));
        assert_eq!(client.base_url, "http://localhost:1234");
    }
}
