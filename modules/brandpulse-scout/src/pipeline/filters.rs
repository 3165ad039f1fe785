// Pure dedup and filtering helpers used by every collection stage.

use std::collections::HashSet;

use brandpulse_common::{raw_text, raw_url, DateRange, Post};
use serde_json::{Map, Value};

/// Texts shorter than this (after trimming) carry no signal.
pub const MIN_TEXT_CHARS: usize = 5;

/// Placeholder texts the scraper emits for pages it could not read.
const BLOCKED_PHRASES: &[&str] = &["page access was blocked", "page is not available"];

/// At least `MIN_TEXT_CHARS` characters after trimming.
pub fn is_substantive(text: &str) -> bool {
    text.trim().chars().count() >= MIN_TEXT_CHARS
}

fn is_blocked_placeholder(text: &str) -> bool {
    let lower = text.to_lowercase();
    BLOCKED_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// Keep a scraper item only if it is a record without an error marker whose
/// text is substantive and not a blocked-page placeholder.
pub fn usable_record(item: Value) -> Option<Map<String, Value>> {
    let Value::Object(record) = item else {
        return None;
    };
    if record.contains_key("error") {
        return None;
    }
    let text = raw_text(&record);
    if !is_substantive(text) || is_blocked_placeholder(text) {
        return None;
    }
    Some(record)
}

/// First occurrence per key wins; items with an empty key are dropped.
fn dedup_by<T>(items: impl IntoIterator<Item = T>, key: impl Fn(&T) -> &str) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let k = key(item);
            !k.is_empty() && seen.insert(k.to_string())
        })
        .collect()
}

pub fn dedup_records(records: Vec<Map<String, Value>>) -> Vec<Map<String, Value>> {
    dedup_by(records, |record| raw_url(record))
}

/// Order-preserving URL dedup. Idempotent.
pub fn dedup_by_url(posts: impl IntoIterator<Item = Post>) -> Vec<Post> {
    dedup_by(posts, |post| post.url.as_str())
}

/// Undated posts always pass. Dated posts pass when their calendar date lies
/// inside the range, bounds included.
pub fn passes_date_filter(post: &Post, range: &DateRange) -> bool {
    post.date().map_or(true, |date| range.contains(date))
}

pub fn filter_by_date(posts: Vec<Post>, range: &DateRange) -> Vec<Post> {
    if range.is_unbounded() {
        return posts;
    }
    posts
        .into_iter()
        .filter(|post| passes_date_filter(post, range))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use brandpulse_common::UrlCategory;
    use chrono::NaiveDate;
    use serde_json::json;

    fn post(url: &str, time: Option<&str>) -> Post {
        let mut raw = json!({"text": "some post text", "url": url});
        if let Some(time) = time {
            raw["time"] = json!(time);
        }
        Post::from_raw(raw.as_object().unwrap(), UrlCategory::Pages)
    }

    fn january() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2025, 1, 1),
            NaiveDate::from_ymd_opt(2025, 1, 31),
        )
    }

    #[test]
    fn dedup_is_idempotent_and_keeps_first() {
        let posts = vec![post("a", None), post("b", None), post("a", Some("2025-01-02")), post("", None)];
        let once = dedup_by_url(posts.clone());
        assert_eq!(once.iter().map(|p| p.url.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(once[0].timestamp.is_none());
        assert_eq!(dedup_by_url(once.clone()), once);

        let doubled: Vec<Post> = posts.iter().chain(posts.iter()).cloned().collect();
        assert_eq!(dedup_by_url(doubled), once);
    }

    #[test]
    fn date_filter_bounds_are_inclusive() {
        let posts = vec![
            post("start", Some("2025-01-01T00:00:00Z")),
            post("end", Some("2025-01-31T23:59:59Z")),
            post("before", Some("2024-12-31T23:59:59Z")),
            post("after", Some("2025-02-01T00:00:00Z")),
            post("undated", None),
        ];
        let kept = filter_by_date(posts, &january());
        let urls: Vec<_> = kept.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["start", "end", "undated"]);
    }

    #[test]
    fn unbounded_range_keeps_everything() {
        let posts = vec![post("old", Some("1999-01-01")), post("new", Some("2030-01-01"))];
        assert_eq!(filter_by_date(posts, &DateRange::default()).len(), 2);
    }

    #[test]
    fn record_filter_drops_noise() {
        assert!(usable_record(json!("just a string")).is_none());
        assert!(usable_record(json!({"error": "no_items", "text": "long enough"})).is_none());
        assert!(usable_record(json!({"text": "   hi   "})).is_none());
        assert!(usable_record(json!({"text": "Page access was BLOCKED by login"})).is_none());
        assert!(usable_record(json!({"message": "This page is not available right now"})).is_none());
        assert!(usable_record(json!({"postText": "Great coffee"})).is_some());
    }

    #[test]
    fn record_dedup_drops_missing_urls() {
        let records: Vec<_> = [
            json!({"url": "u1", "text": "a"}),
            json!({"postUrl": "u1", "text": "b"}),
            json!({"text": "c"}),
            json!({"url": "u2", "text": "d"}),
        ]
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .collect();
        let deduped = dedup_records(records);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0]["text"], "a");
    }
}
