use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::BrandPulseError;

/// Every post we collect comes from the same platform.
pub const PLATFORM: &str = "facebook";

/// Date format used for job date ranges.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// --- URL categories ---

/// Kind of Facebook URL found by the search stage. Declaration order is the
/// order in which categories are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlCategory {
    Mentions,
    Groups,
    Events,
    Pages,
}

impl UrlCategory {
    pub const PRIORITY: [UrlCategory; 4] = [
        UrlCategory::Mentions,
        UrlCategory::Groups,
        UrlCategory::Events,
        UrlCategory::Pages,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UrlCategory::Mentions => "mentions",
            UrlCategory::Groups => "groups",
            UrlCategory::Events => "events",
            UrlCategory::Pages => "pages",
        }
    }
}

impl fmt::Display for UrlCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// --- Posts ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Page,
    Group,
    Event,
    /// Posts reached through a mention URL.
    Post,
}

impl From<UrlCategory> for SourceType {
    fn from(category: UrlCategory) -> Self {
        match category {
            UrlCategory::Pages => SourceType::Page,
            UrlCategory::Groups => SourceType::Group,
            UrlCategory::Events => SourceType::Event,
            UrlCategory::Mentions => SourceType::Post,
        }
    }
}

const TEXT_FIELDS: [&str; 3] = ["text", "postText", "message"];
const URL_FIELDS: [&str; 2] = ["url", "postUrl"];
const TIME_FIELDS: [&str; 3] = ["createdAt", "time", "timestamp"];

/// One scraped social-media item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub text: String,
    /// Identity key for deduplication.
    pub url: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub source_type: SourceType,
    #[serde(default = "default_platform")]
    pub platform: String,
    /// The raw scraper record, kept verbatim.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn default_platform() -> String {
    PLATFORM.to_string()
}

impl Post {
    /// Build a post from a heterogeneous scraper record, trying field aliases
    /// in priority order. Unparseable timestamps become `None`.
    pub fn from_raw(record: &Map<String, Value>, category: UrlCategory) -> Self {
        Self {
            text: raw_text(record).trim().to_string(),
            url: raw_url(record).to_string(),
            author: raw_author(record),
            timestamp: TIME_FIELDS
                .iter()
                .filter_map(|key| record.get(*key))
                .find_map(parse_timestamp),
            source_type: category.into(),
            platform: PLATFORM.to_string(),
            metadata: record.clone(),
        }
    }

    /// Calendar date of the post, if it has a timestamp.
    pub fn date(&self) -> Option<NaiveDate> {
        self.timestamp.map(|ts| ts.date_naive())
    }
}

/// First non-empty text field of a raw record.
pub fn raw_text(record: &Map<String, Value>) -> &str {
    first_str(record, &TEXT_FIELDS)
}

/// First non-empty URL field of a raw record.
pub fn raw_url(record: &Map<String, Value>) -> &str {
    first_str(record, &URL_FIELDS)
}

fn first_str<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> &'a str {
    keys.iter()
        .filter_map(|key| record.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .unwrap_or("")
}

fn raw_author(record: &Map<String, Value>) -> String {
    let candidates = [
        record.get("author").and_then(Value::as_str),
        record
            .get("author")
            .and_then(|a| a.get("name"))
            .and_then(Value::as_str),
        record.get("authorName").and_then(Value::as_str),
        record
            .get("user")
            .and_then(|u| u.get("name"))
            .and_then(Value::as_str),
        record.get("pageName").and_then(Value::as_str),
    ];
    candidates
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .unwrap_or("")
        .to_string()
}

/// Parse a scraper timestamp: epoch seconds or milliseconds (number or digit
/// string), RFC 3339, or a handful of naive formats interpreted as UTC.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.abs() < MAX_EPOCH_MAGNITUDE)
                    .map(|f| f as i64)
            })
            .and_then(from_epoch),
        Value::String(s) => parse_timestamp_str(s.trim()),
        _ => None,
    }
}

/// Float epochs beyond this are garbage rather than dates.
const MAX_EPOCH_MAGNITUDE: f64 = 1e15;

fn from_epoch(raw: i64) -> Option<DateTime<Utc>> {
    // Anything past ~5000 AD in seconds is really milliseconds.
    if raw.unsigned_abs() > 100_000_000_000 {
        DateTime::from_timestamp_millis(raw)
    } else {
        DateTime::from_timestamp(raw, 0)
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if s.chars().all(|c| c.is_ascii_digit()) {
        return s.parse().ok().and_then(from_epoch);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// --- Date ranges ---

/// Inclusive calendar-date bounds. A missing bound is open-ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// Parse `YYYY-MM-DD` bounds; empty strings mean "no bound".
    pub fn parse(start: &str, end: &str) -> Result<Self, BrandPulseError> {
        Ok(Self {
            start: parse_bound(start)?,
            end: parse_bound(end)?,
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Human-readable form for prompts and logs.
    pub fn describe(&self) -> String {
        match (self.start, self.end) {
            (Some(s), Some(e)) => format!("{s} to {e}"),
            (Some(s), None) => format!("from {s}"),
            (None, Some(e)) => format!("until {e}"),
            (None, None) => "any date".to_string(),
        }
    }
}

fn parse_bound(raw: &str) -> Result<Option<NaiveDate>, BrandPulseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map(Some)
        .map_err(|_| BrandPulseError::Validation(format!("invalid date '{raw}', expected YYYY-MM-DD")))
}

// --- Taxonomy ---

/// One discussion aspect in a job's taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aspect {
    #[serde(alias = "aspekt", alias = "name")]
    pub aspect: String,
    #[serde(default, alias = "definicja", alias = "description")]
    pub definition: String,
}

/// Job-scoped label set. Aspect names are not guaranteed unique; lookups
/// return the first match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub aspects: Vec<Aspect>,
    pub generated_at: DateTime<Utc>,
}

impl Taxonomy {
    pub fn new(aspects: Vec<Aspect>) -> Self {
        Self {
            aspects,
            generated_at: Utc::now(),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.aspects.iter().map(|a| a.aspect.as_str()).collect()
    }

    /// Case-insensitive lookup, first match wins.
    pub fn find(&self, name: &str) -> Option<&Aspect> {
        let needle = name.trim().to_lowercase();
        self.aspects
            .iter()
            .find(|a| a.aspect.trim().to_lowercase() == needle)
    }

    pub fn is_empty(&self) -> bool {
        self.aspects.is_empty()
    }
}

// --- Classification ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative];

    /// Map a model-supplied label onto the three-valued scale. Anything
    /// unrecognised, including a missing value, becomes `Neutral`.
    pub fn coerce(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("positive") => Sentiment::Positive,
            Some("negative") => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Label for one post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub sentiment: Sentiment,
    /// URL of the labeled post at classification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Post index (position in `Job::posts` at classification time) → label.
pub type ClassificationMap = BTreeMap<usize, Classification>;

// --- Jobs ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Scraping,
    Classifying,
    Completed,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Scraping => "scraping",
            JobStatus::Classifying => "classifying",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Aggregate root for one brand-analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub brand_name: String,
    pub start_date: String,
    pub end_date: String,
    pub status: JobStatus,
    #[serde(default)]
    pub current_step: String,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub posts: Vec<Post>,
    #[serde(default)]
    pub taxonomy: Option<Taxonomy>,
    #[serde(default)]
    pub classifications: ClassificationMap,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        brand_name: impl Into<String>,
        start_date: impl Into<String>,
        end_date: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            brand_name: brand_name.into(),
            start_date: start_date.into(),
            end_date: end_date.into(),
            status: JobStatus::Pending,
            current_step: String::new(),
            progress: 0.0,
            posts: Vec::new(),
            taxonomy: None,
            classifications: ClassificationMap::new(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a step; `fraction` is clamped to [0, 1].
    pub fn update_progress(&mut self, step: impl Into<String>, fraction: f64) {
        self.current_step = step.into();
        self.progress = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error_message = Some(message.into());
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, step: impl Into<String>) {
        self.status = JobStatus::Completed;
        self.update_progress(step, 1.0);
    }

    pub fn date_range(&self) -> Result<DateRange, BrandPulseError> {
        DateRange::parse(&self.start_date, &self.end_date)
    }

    pub fn has_classification(&self) -> bool {
        !self.classifications.is_empty()
    }

    /// Labels keyed by post URL instead of position. Entries whose index no
    /// longer points at a post are dropped.
    pub fn classifications_by_url(&self) -> HashMap<&str, &Classification> {
        self.classifications
            .iter()
            .filter_map(|(idx, c)| self.posts.get(*idx).map(|p| (p.url.as_str(), c)))
            .collect()
    }

    /// Indices whose recorded URL disagrees with the post now at that
    /// position, or that point past the end of the post list.
    pub fn stale_classification_indices(&self) -> Vec<usize> {
        self.classifications
            .iter()
            .filter(|(idx, c)| match (self.posts.get(**idx), &c.url) {
                (None, _) => true,
                (Some(post), Some(url)) => &post.url != url,
                (Some(_), None) => false,
            })
            .map(|(idx, _)| *idx)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn post_from_raw_uses_alias_priority() {
        let raw = record(json!({
            "postText": "  Great service at Acme  ",
            "message": "ignored",
            "postUrl": "https://facebook.com/acme/posts/1",
            "authorName": "Jan",
            "time": "2025-03-04T10:15:00Z",
        }));
        let post = Post::from_raw(&raw, UrlCategory::Mentions);
        assert_eq!(post.text, "Great service at Acme");
        assert_eq!(post.url, "https://facebook.com/acme/posts/1");
        assert_eq!(post.author, "Jan");
        assert_eq!(post.source_type, SourceType::Post);
        assert_eq!(post.platform, "facebook");
        assert_eq!(post.date(), NaiveDate::from_ymd_opt(2025, 3, 4));
        assert_eq!(post.metadata, raw);
    }

    #[test]
    fn post_from_raw_accepts_epoch_seconds_and_millis() {
        let secs = Post::from_raw(&record(json!({"text": "hello", "timestamp": 1_700_000_000})), UrlCategory::Pages);
        let millis = Post::from_raw(&record(json!({"text": "hello", "timestamp": 1_700_000_000_000i64})), UrlCategory::Pages);
        assert_eq!(secs.timestamp, millis.timestamp);
        assert_eq!(secs.date(), NaiveDate::from_ymd_opt(2023, 11, 14));
    }

    #[test]
    fn bad_timestamp_falls_back_to_none() {
        let post = Post::from_raw(&record(json!({"text": "hello", "createdAt": "yesterday-ish"})), UrlCategory::Groups);
        assert!(post.timestamp.is_none());
        assert_eq!(post.source_type, SourceType::Group);
    }

    #[test]
    fn extreme_epoch_values_fall_back_to_none() {
        for ts in [json!(-1e30), json!(1e300), json!(i64::MIN), json!(i64::MAX), json!(-1.5e18)] {
            let post = Post::from_raw(&record(json!({"text": "hello world", "url": "u", "timestamp": ts})), UrlCategory::Pages);
            assert!(post.timestamp.is_none(), "{:?}", post.metadata["timestamp"]);
        }
        assert!(parse_timestamp(&json!("-9223372036854775808")).is_none());
    }

    #[test]
    fn later_time_alias_used_when_earlier_unparseable() {
        let post = Post::from_raw(
            &record(json!({"text": "hello", "createdAt": "garbage", "time": "2024-01-02"})),
            UrlCategory::Events,
        );
        assert_eq!(post.date(), NaiveDate::from_ymd_opt(2024, 1, 2));
    }

    #[test]
    fn author_can_be_nested_object() {
        let post = Post::from_raw(&record(json!({"text": "x", "author": {"name": "Ola"}})), UrlCategory::Pages);
        assert_eq!(post.author, "Ola");
    }

    #[test]
    fn date_range_inclusive_and_open_ended() {
        let range = DateRange::parse("2025-01-01", "2025-01-31").unwrap();
        assert!(range.contains(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()));
        assert!(range.contains(NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()));

        let open = DateRange::parse("", "2025-01-31").unwrap();
        assert!(open.contains(NaiveDate::from_ymd_opt(1999, 1, 1).unwrap()));
        assert!(DateRange::parse("2025-13-01", "").is_err());
    }

    #[test]
    fn sentiment_coercion() {
        assert_eq!(Sentiment::coerce(Some("positive")), Sentiment::Positive);
        assert_eq!(Sentiment::coerce(Some(" Negative ")), Sentiment::Negative);
        assert_eq!(Sentiment::coerce(Some("neutral")), Sentiment::Neutral);
        assert_eq!(Sentiment::coerce(Some("mixed")), Sentiment::Neutral);
        assert_eq!(Sentiment::coerce(Some("")), Sentiment::Neutral);
        assert_eq!(Sentiment::coerce(None), Sentiment::Neutral);
    }

    #[test]
    fn taxonomy_lookup_first_match_wins() {
        let taxonomy = Taxonomy::new(vec![
            Aspect { aspect: "Price".into(), definition: "first".into() },
            Aspect { aspect: "price".into(), definition: "second".into() },
        ]);
        assert_eq!(taxonomy.find("PRICE").unwrap().definition, "first");
        assert!(taxonomy.find("Service").is_none());
    }

    #[test]
    fn aspect_accepts_polish_keys() {
        let aspect: Aspect = serde_json::from_value(json!({"aspekt": "Cena", "definicja": "Koszt"})).unwrap();
        assert_eq!(aspect.aspect, "Cena");
        assert_eq!(aspect.definition, "Koszt");
    }

    #[test]
    fn progress_is_clamped() {
        let mut job = Job::new("Acme", "2025-01-01", "2025-02-01");
        job.update_progress("too far", 1.7);
        assert_eq!(job.progress, 1.0);
        job.update_progress("negative", -0.2);
        assert_eq!(job.progress, 0.0);
    }

    #[test]
    fn job_snapshot_roundtrips_with_string_index_keys() {
        let mut job = Job::new("Acme", "2025-01-01", "2025-02-01");
        job.classifications.insert(
            3,
            Classification { category: "Price".into(), sentiment: Sentiment::Negative, url: None },
        );
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["classifications"]["3"]["sentiment"], "negative");
        let back: Job = serde_json::from_value(json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn stale_indices_detect_reordering() {
        let mut job = Job::new("Acme", "", "");
        let raw = |url: &str| record(json!({"text": "some text", "url": url}));
        job.posts = vec![
            Post::from_raw(&raw("https://fb.com/a"), UrlCategory::Pages),
            Post::from_raw(&raw("https://fb.com/b"), UrlCategory::Pages),
        ];
        job.classifications.insert(0, Classification {
            category: "C".into(), sentiment: Sentiment::Neutral, url: Some("https://fb.com/b".into()),
        });
        job.classifications.insert(1, Classification {
            category: "C".into(), sentiment: Sentiment::Neutral, url: Some("https://fb.com/b".into()),
        });
        job.classifications.insert(5, Classification {
            category: "C".into(), sentiment: Sentiment::Neutral, url: None,
        });
        assert_eq!(job.stale_classification_indices(), vec![0, 5]);
        assert_eq!(job.classifications_by_url().len(), 1);
    }
}
