//! Iterative widening: re-scrape a category with growing per-source limits
//! until enough posts survive client-side filtering.
//!
//! The scraping backend has no date-range parameter, so recall is bought with
//! request volume. Each round asks for `limit` posts per URL; posts already
//! seen in an earlier round are ignored; the rest go through the date filter
//! and the optional relevance check.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, info};

use brandpulse_common::{DateRange, Post, UrlCategory};

use super::filters::filter_by_date;
use super::scrape::SourceScrape;
use super::verifier::RelevanceVerifier;

pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Knobs for one widening run.
#[derive(Debug, Clone, Copy)]
pub struct WideningParams {
    pub needed: usize,
    pub starting_limit: u32,
    pub max_limit: u32,
    pub multiplier: f64,
}

impl WideningParams {
    pub fn new(needed: usize, starting_limit: u32, max_limit: u32) -> Self {
        Self {
            needed,
            starting_limit,
            max_limit,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Next per-source limit, capped at `max_limit`. Always grows by at least one.
    fn next_limit(&self, limit: u32) -> u32 {
        let scaled = (f64::from(limit) * self.multiplier).ceil();
        let scaled = if scaled.is_finite() && scaled < f64::from(u32::MAX) {
            scaled as u32
        } else {
            u32::MAX
        };
        scaled.max(limit.saturating_add(1)).min(self.max_limit)
    }
}

/// Brand context for the per-post relevance check.
#[derive(Clone, Copy)]
pub struct Relevance<'a> {
    pub verifier: &'a RelevanceVerifier,
    pub brand: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    /// The oracle returned nothing at all.
    NoRawRecords,
    /// Everything returned had been seen in an earlier round.
    NoNewPosts,
    /// Every new post fell outside the date range.
    AllOutOfRange,
    /// The URLs that answered returned fewer raw records than requested:
    /// the sources have no more.
    SourcesExhausted,
    LimitCeiling,
    NoUrls,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::TargetReached => "target reached",
            StopReason::NoRawRecords => "no raw records",
            StopReason::NoNewPosts => "no new posts",
            StopReason::AllOutOfRange => "all new posts out of date range",
            StopReason::SourcesExhausted => "sources exhausted",
            StopReason::LimitCeiling => "limit ceiling reached",
            StopReason::NoUrls => "no urls",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct WideningOutcome {
    pub posts: Vec<Post>,
    pub rounds: u32,
    /// The last per-source limit requested.
    pub final_limit: u32,
    pub rejected_by_date: usize,
    pub rejected_by_verifier: usize,
    pub stop: StopReason,
}

/// Scrape `urls` with escalating limits until `params.needed` posts pass the
/// filters or one of the stop conditions fires. Never errors: scrape failures
/// already degrade to empty rounds.
pub async fn fetch_until_target(
    scrape: &SourceScrape,
    urls: &[String],
    category: UrlCategory,
    date_range: &DateRange,
    params: WideningParams,
    relevance: Option<Relevance<'_>>,
) -> WideningOutcome {
    let mut outcome = WideningOutcome {
        posts: Vec::new(),
        rounds: 0,
        final_limit: 0,
        rejected_by_date: 0,
        rejected_by_verifier: 0,
        stop: StopReason::NoUrls,
    };
    if urls.is_empty() || params.needed == 0 {
        if params.needed == 0 {
            outcome.stop = StopReason::TargetReached;
        }
        return outcome;
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut limit = params.starting_limit.clamp(1, params.max_limit.max(1));

    loop {
        outcome.rounds += 1;
        outcome.final_limit = limit;
        let batch = scrape.scrape(urls, category, limit).await;

        if batch.raw_count == 0 {
            outcome.stop = StopReason::NoRawRecords;
            break;
        }

        let fresh: Vec<Post> = batch
            .records
            .iter()
            .map(|record| Post::from_raw(record, category))
            .filter(|post| seen.insert(post.url.clone()))
            .collect();
        if fresh.is_empty() {
            outcome.stop = StopReason::NoNewPosts;
            break;
        }

        let fresh_count = fresh.len();
        let in_range = filter_by_date(fresh, date_range);
        outcome.rejected_by_date += fresh_count - in_range.len();
        if in_range.is_empty() {
            outcome.stop = StopReason::AllOutOfRange;
            break;
        }

        for post in in_range {
            if outcome.posts.len() >= params.needed {
                break;
            }
            if let Some(Relevance { verifier, brand }) = relevance {
                let verdict = verifier
                    .verify(&post.text, post.date(), brand, date_range)
                    .await;
                if !verdict.valid {
                    debug!(url = post.url.as_str(), reason = verdict.reason.as_str(), "Post rejected as off-topic");
                    outcome.rejected_by_verifier += 1;
                    continue;
                }
            }
            outcome.posts.push(post);
        }

        if outcome.posts.len() >= params.needed {
            outcome.stop = StopReason::TargetReached;
            break;
        }
        let requested = (limit as usize).saturating_mul(batch.answered);
        if batch.raw_count < requested {
            outcome.stop = StopReason::SourcesExhausted;
            break;
        }
        if limit >= params.max_limit {
            outcome.stop = StopReason::LimitCeiling;
            break;
        }

        let next = params.next_limit(limit);
        debug!(%category, limit, next, accepted = outcome.posts.len(), needed = params.needed, "Widening");
        limit = next;
    }

    info!(
        %category,
        accepted = outcome.posts.len(),
        needed = params.needed,
        rounds = outcome.rounds,
        final_limit = outcome.final_limit,
        rejected_by_date = outcome.rejected_by_date,
        rejected_by_verifier = outcome.rejected_by_verifier,
        stop = %outcome.stop,
        "Widening fetch finished"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_limit_grows_and_caps() {
        let params = WideningParams::new(10, 5, 100);
        assert_eq!(params.next_limit(5), 10);
        assert_eq!(params.next_limit(60), 100);
        assert_eq!(params.with_multiplier(1.5).next_limit(5), 8);
        assert_eq!(params.with_multiplier(1.0).next_limit(5), 6);
    }
}
