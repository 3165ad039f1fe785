use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wrapper for Apify API responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Input for the apify/google-search-scraper actor.
#[derive(Debug, Clone, Serialize)]
pub struct GoogleSearchInput {
    /// Newline-separated queries; we always send one.
    pub queries: String,
    #[serde(rename = "resultsPerPage")]
    pub results_per_page: u32,
    #[serde(rename = "maxPagesPerQuery")]
    pub max_pages_per_query: u32,
}

/// Input for the apify/facebook-posts-scraper actor.
#[derive(Debug, Clone, Serialize)]
pub struct FacebookScraperInput {
    #[serde(rename = "startUrls")]
    pub start_urls: Vec<StartUrl>,
    #[serde(rename = "resultsLimit")]
    pub results_limit: u32,
}

/// A start URL entry for Facebook scraper input.
#[derive(Debug, Clone, Serialize)]
pub struct StartUrl {
    pub url: String,
}

/// Terminal and in-flight states of an actor run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Ready,
    Running,
    Succeeded,
    Failed,
    Aborted,
    TimedOut,
    Other(String),
}

impl RunStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "READY" => RunStatus::Ready,
            "RUNNING" => RunStatus::Running,
            "SUCCEEDED" => RunStatus::Succeeded,
            "FAILED" => RunStatus::Failed,
            "ABORTED" => RunStatus::Aborted,
            "TIMED-OUT" => RunStatus::TimedOut,
            other => RunStatus::Other(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Aborted | RunStatus::TimedOut
        )
    }
}

/// Apify actor run metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub id: String,
    pub status: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
    #[serde(rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunData {
    pub fn run_status(&self) -> RunStatus {
        RunStatus::parse(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_terminal_states() {
        assert!(RunStatus::parse("SUCCEEDED").is_terminal());
        assert!(RunStatus::parse("TIMED-OUT").is_terminal());
        assert!(!RunStatus::parse("RUNNING").is_terminal());
        assert_eq!(
            RunStatus::parse("ABORTING"),
            RunStatus::Other("ABORTING".to_string())
        );
    }

    #[test]
    fn facebook_input_uses_actor_field_names() {
        let input = FacebookScraperInput {
            start_urls: vec![StartUrl {
                url: "https://facebook.com/acme".into(),
            }],
            results_limit: 15,
        };
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(value["startUrls"][0]["url"], "https://facebook.com/acme");
        assert_eq!(value["resultsLimit"], 15);
    }

    #[test]
    fn run_data_parses_api_payload() {
        let json = r#"{"data":{"id":"run1","status":"RUNNING","defaultDatasetId":"ds1","startedAt":"2025-03-01T10:00:00.000Z","finishedAt":null}}"#;
        let resp: ApiResponse<RunData> = serde_json::from_str(json).unwrap();
        assert_eq!(resp.data.run_status(), RunStatus::Running);
        assert_eq!(resp.data.default_dataset_id, "ds1");
        assert!(resp.data.finished_at.is_none());
    }
}
