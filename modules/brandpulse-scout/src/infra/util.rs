// URL helpers shared by the search and scrape stages.

use brandpulse_common::UrlCategory;

/// Only URLs on this host are considered post sources.
pub const TARGET_HOST: &str = "facebook.com";

/// Path fragments that never lead to post content.
const BLOCKED_PATHS: &[&str] = &[
    "/login",
    "/search",
    "/help",
    "/about",
    "/policies",
    "/media/set",
];

/// Drop query string and fragment, then any trailing slashes.
///
/// Search results carry tracking parameters and anchors that make the same
/// page look like several distinct sources.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    let stripped = match url::Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => {
            let end = trimmed.find(['?', '#']).unwrap_or(trimmed.len());
            trimmed[..end].to_string()
        }
    };
    stripped.trim_end_matches('/').to_string()
}

/// A normalized URL worth scraping: on the target host and not a utility page.
/// Matching ignores case.
pub fn is_content_url(url: &str) -> bool {
    let url = url.to_lowercase();
    url.contains(TARGET_HOST) && !BLOCKED_PATHS.iter().any(|blocked| url.contains(blocked))
}

/// First match on path substring wins. Matching ignores case.
pub fn categorize_url(url: &str) -> UrlCategory {
    let url = url.to_lowercase();
    if url.contains("/groups/") {
        UrlCategory::Groups
    } else if url.contains("/events/") || url.contains("/permalink/") {
        UrlCategory::Events
    } else if url.contains("/posts/") {
        UrlCategory::Mentions
    } else {
        UrlCategory::Pages
    }
}
