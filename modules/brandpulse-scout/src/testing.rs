// Test doubles for the pipeline's trait boundaries.
//
// - MockSearcher (WebSearcher): query → canned records
// - MockScraper (PostScraper): URL → records, honouring the requested limit
// - ScriptedModel / FailingModel (TextModel): prompt-matched replies
// - MemoryStore (JobStore): in-memory, counts durable writes
// - RecordingSink (ProgressSink): records every report and checkpoint
//
// Plus builders for raw scraper records, posts and taxonomies.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use ai_client::TextModel;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use brandpulse_common::{Aspect, ClassificationMap, Job, Post, Taxonomy, UrlCategory};

use crate::store::JobStore;
use crate::traits::{PostScraper, ProgressSink, WebSearcher};

// ---------------------------------------------------------------------------
// MockSearcher
// ---------------------------------------------------------------------------

/// Returns `Err` for unregistered queries. Queries are matched exactly,
/// site restriction included.
#[derive(Default)]
pub struct MockSearcher {
    results: HashMap<String, Vec<Value>>,
    calls: Mutex<Vec<String>>,
    max_results: Mutex<Vec<u32>>,
}

impl MockSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_query(mut self, query: &str, records: Vec<Value>) -> Self {
        self.results.insert(query.to_string(), records);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// The result count asked for on each call, in call order.
    pub fn max_results_requested(&self) -> Vec<u32> {
        self.max_results.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebSearcher for MockSearcher {
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<Value>> {
        self.calls.lock().unwrap().push(query.to_string());
        self.max_results.lock().unwrap().push(max_results);
        match self.results.get(query) {
            Some(records) => Ok(records.clone()),
            None => bail!("MockSearcher: no results registered for {query}"),
        }
    }
}

// ---------------------------------------------------------------------------
// MockScraper
// ---------------------------------------------------------------------------

type RecordFn = Box<dyn Fn(u32) -> Vec<Value> + Send + Sync>;

/// URL → records. Registered lists are cut to the requested limit, like the
/// real actor. Unregistered URLs return `Err`.
#[derive(Default)]
pub struct MockScraper {
    sources: HashMap<String, RecordFn>,
    failing: HashSet<String>,
    calls: Mutex<Vec<(String, u32)>>,
}

impl MockScraper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_url(self, url: &str, records: Vec<Value>) -> Self {
        self.on_url_fn(url, move |limit| records.iter().take(limit as usize).cloned().collect())
    }

    /// Records computed from the requested per-URL limit.
    pub fn on_url_fn(mut self, url: &str, f: impl Fn(u32) -> Vec<Value> + Send + Sync + 'static) -> Self {
        self.sources.insert(url.to_string(), Box::new(f));
        self
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    /// Every (url, limit) requested, in call order.
    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_limit_requested(&self) -> u32 {
        self.calls().iter().map(|(_, limit)| *limit).max().unwrap_or(0)
    }
}

#[async_trait]
impl PostScraper for MockScraper {
    async fn scrape(&self, urls: &[String], max_posts_per_url: u32) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        for url in urls {
            self.calls.lock().unwrap().push((url.clone(), max_posts_per_url));
            if self.failing.contains(url) {
                bail!("MockScraper: {url} is configured to fail");
            }
            match self.sources.get(url) {
                Some(f) => out.extend(f(max_posts_per_url)),
                None => bail!("MockScraper: no posts registered for {url}"),
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Text models
// ---------------------------------------------------------------------------

type ReplyFn = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Replies chosen by prompt content. Rules are checked in registration
/// order; with no match the fallback reply is used, or the call fails.
#[derive(Default)]
pub struct ScriptedModel {
    rules: Vec<ReplyFn>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `reply` whenever the prompt contains `needle`.
    pub fn when(self, needle: &str, reply: &str) -> Self {
        let needle = needle.to_string();
        let reply = reply.to_string();
        self.when_fn(move |prompt| prompt.contains(&needle).then(|| reply.clone()))
    }

    pub fn when_fn(mut self, f: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.rules.push(Box::new(f));
        self
    }

    pub fn otherwise(mut self, reply: &str) -> Self {
        self.fallback = Some(reply.to_string());
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl TextModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(reply) = self.rules.iter().find_map(|rule| rule(prompt)) {
            return Ok(reply);
        }
        match &self.fallback {
            Some(reply) => Ok(reply.clone()),
            None => bail!("ScriptedModel: no reply for prompt"),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Every call errors, like an unreachable endpoint.
#[derive(Default)]
pub struct FailingModel {
    calls: Mutex<usize>,
}

impl FailingModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl TextModel for FailingModel {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        bail!("FailingModel: connection refused")
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
    durable: Mutex<HashMap<Uuid, Job>>,
    persists: Mutex<HashMap<Uuid, usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of durable writes (`save` + `persist`) for a job.
    pub fn persist_count(&self, id: Uuid) -> usize {
        self.persists.lock().unwrap().get(&id).copied().unwrap_or(0)
    }

    /// Last durably written snapshot.
    pub fn durable(&self, id: Uuid) -> Option<Job> {
        self.durable.lock().unwrap().get(&id).cloned()
    }

    fn write_durable(&self, job: &Job) {
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        self.durable.lock().unwrap().insert(job.id, job.clone());
        *self.persists.lock().unwrap().entry(job.id).or_default() += 1;
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn save(&self, job: &Job) -> Result<()> {
        self.write_durable(job);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, job: &Job) -> Result<()> {
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(())
    }

    async fn persist(&self, job: &Job) -> Result<()> {
        self.write_durable(job);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Job>> {
        Ok(self.jobs.lock().unwrap().values().cloned().collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        self.durable.lock().unwrap().remove(&id);
        Ok(self.jobs.lock().unwrap().remove(&id).is_some())
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<(String, f64)>>,
    checkpoints: Mutex<Vec<(usize, bool)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(String, f64)> {
        self.reports.lock().unwrap().clone()
    }

    pub fn fractions(&self) -> Vec<f64> {
        self.reports().into_iter().map(|(_, f)| f).collect()
    }

    /// (entries in the map, durable) per checkpoint call.
    pub fn checkpoints(&self) -> Vec<(usize, bool)> {
        self.checkpoints.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn report(&self, step: &str, fraction: f64) {
        self.reports.lock().unwrap().push((step.to_string(), fraction));
    }

    async fn checkpoint_classifications(&self, results: &ClassificationMap, durable: bool) {
        self.checkpoints.lock().unwrap().push((results.len(), durable));
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// A raw scraper record in the actor's output shape.
pub fn raw_post(url: &str, text: &str, time: Option<&str>) -> Value {
    let mut record = json!({
        "postUrl": url,
        "text": text,
        "user": {"name": "Test User"},
    });
    if let Some(time) = time {
        record["time"] = json!(time);
    }
    record
}

/// A search record in the flat `{url}` shape.
pub fn search_link(url: &str) -> Value {
    json!({"url": url, "title": "result"})
}

/// A search record wrapping `organicResults`.
pub fn search_page(urls: &[&str]) -> Value {
    json!({
        "searchQuery": {"term": "test"},
        "organicResults": urls.iter().map(|u| json!({"url": u})).collect::<Vec<_>>(),
    })
}

pub fn post(url: &str, text: &str) -> Post {
    let record = raw_post(url, text, None);
    let map = record.as_object().cloned().unwrap_or_default();
    Post::from_raw(&map, UrlCategory::Pages)
}

pub fn taxonomy(names: &[&str]) -> Taxonomy {
    Taxonomy::new(
        names
            .iter()
            .map(|name| Aspect {
                aspect: name.to_string(),
                definition: format!("Posts about {name}"),
            })
            .collect(),
    )
}
