use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{info, warn};

use brandpulse_common::UrlCategory;

use crate::infra::util::{categorize_url, is_content_url, normalize_url};
use crate::traits::WebSearcher;

/// Only the first this-many queries are sent.
pub const MAX_QUERIES: usize = 10;

/// Concurrent searches in flight.
pub const SEARCH_CONCURRENCY: usize = 3;

/// Results requested per query.
pub const RESULTS_PER_QUERY: u32 = 20;

/// Appended to every query so results stay on the target platform.
pub const SITE_RESTRICTION: &str = " site:facebook.com";

/// One record from the search backend.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchRecord {
    /// A flat `{url}` or `{link}` row.
    Link(String),
    /// A results page wrapping an `organicResults` list.
    OrganicResults(Vec<String>),
    Unrecognized,
}

impl SearchRecord {
    pub fn from_value(value: &Value) -> Self {
        if let Some(organic) = value.get("organicResults").and_then(Value::as_array) {
            return SearchRecord::OrganicResults(organic.iter().filter_map(link_of).collect());
        }
        match link_of(value) {
            Some(link) => SearchRecord::Link(link),
            None => SearchRecord::Unrecognized,
        }
    }

    pub fn into_links(self) -> Vec<String> {
        match self {
            SearchRecord::Link(link) => vec![link],
            SearchRecord::OrganicResults(links) => links,
            SearchRecord::Unrecognized => Vec::new(),
        }
    }
}

fn link_of(value: &Value) -> Option<String> {
    ["url", "link"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Candidate source URLs grouped by category. Each list is duplicate-free
/// and in discovery order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FoundUrls {
    pub mentions: Vec<String>,
    pub groups: Vec<String>,
    pub events: Vec<String>,
    pub pages: Vec<String>,
}

impl FoundUrls {
    /// Normalize, screen and file a raw link. Returns whether it was new.
    pub fn insert(&mut self, raw: &str) -> bool {
        let url = normalize_url(raw);
        if !is_content_url(&url) {
            return false;
        }
        let bucket = self.bucket_mut(categorize_url(&url));
        if bucket.contains(&url) {
            return false;
        }
        bucket.push(url);
        true
    }

    pub fn get(&self, category: UrlCategory) -> &[String] {
        match category {
            UrlCategory::Mentions => &self.mentions,
            UrlCategory::Groups => &self.groups,
            UrlCategory::Events => &self.events,
            UrlCategory::Pages => &self.pages,
        }
    }

    fn bucket_mut(&mut self, category: UrlCategory) -> &mut Vec<String> {
        match category {
            UrlCategory::Mentions => &mut self.mentions,
            UrlCategory::Groups => &mut self.groups,
            UrlCategory::Events => &mut self.events,
            UrlCategory::Pages => &mut self.pages,
        }
    }

    pub fn total(&self) -> usize {
        UrlCategory::PRIORITY.iter().map(|c| self.get(*c).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Runs search queries against the web-search oracle and sorts what comes
/// back into source categories.
pub struct SourceSearch {
    searcher: Arc<dyn WebSearcher>,
}

impl SourceSearch {
    pub fn new(searcher: Arc<dyn WebSearcher>) -> Self {
        Self { searcher }
    }

    /// A failed query is logged and contributes nothing.
    pub async fn search(&self, brand: &str, queries: &[String]) -> FoundUrls {
        let queries: Vec<String> = queries
            .iter()
            .take(MAX_QUERIES)
            .map(|q| format!("{q}{SITE_RESTRICTION}"))
            .collect();
        info!(brand, queries = queries.len(), "Searching for source URLs");

        let results: Vec<_> = stream::iter(queries.into_iter().map(|query| {
            let searcher = self.searcher.clone();
            async move {
                let result = searcher.search(&query, RESULTS_PER_QUERY).await;
                (query, result)
            }
        }))
        .buffered(SEARCH_CONCURRENCY)
        .collect()
        .await;

        let mut found = FoundUrls::default();
        for (query, result) in results {
            match result {
                Ok(records) => {
                    let added = records
                        .iter()
                        .flat_map(|r| SearchRecord::from_value(r).into_links())
                        .filter(|link| found.insert(link))
                        .count();
                    info!(query = query.as_str(), records = records.len(), added, "Search query done");
                }
                Err(e) => {
                    warn!(query = query.as_str(), error = %e, "Search query failed");
                }
            }
        }

        info!(
            brand,
            mentions = found.mentions.len(),
            groups = found.groups.len(),
            events = found.events.len(),
            pages = found.pages.len(),
            "Source search complete"
        );
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_record_shapes() {
        assert_eq!(
            SearchRecord::from_value(&json!({"url": "https://facebook.com/a"})),
            SearchRecord::Link("https://facebook.com/a".into())
        );
        assert_eq!(
            SearchRecord::from_value(&json!({"link": "https://facebook.com/b"})),
            SearchRecord::Link("https://facebook.com/b".into())
        );
        assert_eq!(
            SearchRecord::from_value(&json!({"organicResults": [{"url": "x"}, {"link": "y"}, {"title": "z"}]})),
            SearchRecord::OrganicResults(vec!["x".into(), "y".into()])
        );
        assert_eq!(SearchRecord::from_value(&json!({"title": "nothing"})), SearchRecord::Unrecognized);
        assert_eq!(SearchRecord::from_value(&json!(17)), SearchRecord::Unrecognized);
    }

    #[test]
    fn found_urls_has_set_semantics() {
        let mut found = FoundUrls::default();
        assert!(found.insert("https://www.facebook.com/acme/posts/1?ref=x"));
        assert!(!found.insert("https://www.facebook.com/acme/posts/1/"));
        assert!(!found.insert("https://www.facebook.com/login"));
        assert!(found.insert("https://www.facebook.com/groups/acme-fans"));
        assert_eq!(found.mentions, vec!["https://www.facebook.com/acme/posts/1"]);
        assert_eq!(found.groups.len(), 1);
        assert_eq!(found.total(), 2);
    }
}
