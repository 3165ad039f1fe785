pub mod classifier;
pub mod filters;
pub mod orchestrator;
pub mod queries;
pub mod report;
pub mod scrape;
pub mod search;
pub mod stats;
pub mod taxonomy;
pub mod verifier;
pub mod widening;


/// Why one unit of best-effort work produced nothing.
///
/// Per-item loops collect `Result<T, SkipReason>`, keep the successes, and
/// count and log the rest.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SkipReason {
    #[error("text too short")]
    TooShort,
    #[error("oracle call failed: {0}")]
    OracleFailed(String),
    #[error("unreadable reply: {0}")]
    Unparseable(String),
}
