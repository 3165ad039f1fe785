//! Background workflows: whole pipeline runs executed for one job.
//!
//! Each workflow owns the job for its duration (behind `Arc<Mutex<Job>>`) and
//! writes snapshots through `JobProgress`. Long-lived collaborators live in
//! `PipelineDeps`, built once at startup and shared by every run.

pub mod progress;
pub mod runner;
pub mod validate;

pub use progress::{JobProgress, ScaledProgress};
pub use runner::{JobHandle, JobRunner, TaskOutcome};
pub use validate::{validate_request, ScrapeRequest};

use std::sync::Arc;

use ai_client::{Claude, Gemini, TextModel};
use anyhow::Result;
use apify_client::ApifyClient;
use tracing::{info, warn};

use brandpulse_common::{BrandPulseError, Config, JobStatus, LlmProvider};

use crate::pipeline::classifier::ClassificationStage;
use crate::pipeline::orchestrator::ScrapingOrchestrator;
use crate::pipeline::report::ReportGenerator;
use crate::pipeline::taxonomy::TaxonomyGenerator;
use crate::pipeline::verifier::RelevanceVerifier;
use crate::traits::ProgressSink;

/// Shared dependency container for all workflows.
pub struct PipelineDeps {
    pub orchestrator: ScrapingOrchestrator,
    pub taxonomy: TaxonomyGenerator,
    pub classifier: ClassificationStage,
    pub report: ReportGenerator,
}

impl PipelineDeps {
    /// Production wiring: Apify for search and scraping, the configured LLM
    /// provider for everything textual. Query expansion, taxonomy and the
    /// report use the main model; verification and labeling use the lite one.
    pub fn from_config(config: &Config) -> Self {
        let main_model = text_model(config, &config.llm_model);
        let lite_model = text_model(config, &config.llm_lite_model);
        let apify = Arc::new(
            ApifyClient::new(config.apify_api_token.clone()).with_max_wait(config.scraping_timeout),
        );

        let mut orchestrator = ScrapingOrchestrator::new(main_model.clone(), apify.clone(), apify)
            .with_target(config.max_results)
            .with_max_limit(config.max_actor_results);
        if config.verify_relevance {
            orchestrator = orchestrator.with_verifier(RelevanceVerifier::new(lite_model.clone()));
        }

        Self {
            orchestrator,
            taxonomy: TaxonomyGenerator::new(main_model.clone()),
            classifier: ClassificationStage::new(lite_model),
            report: ReportGenerator::new(main_model),
        }
    }
}

fn text_model(config: &Config, model: &str) -> Arc<dyn TextModel> {
    match config.llm_provider {
        LlmProvider::Gemini => Arc::new(Gemini::new(config.llm_api_key.clone(), model)),
        LlmProvider::Claude => Arc::new(Claude::new(config.llm_api_key.clone(), model)),
    }
}

// ---------------------------------------------------------------------------
// Workflow bodies
// ---------------------------------------------------------------------------

/// Orchestrator progress is folded into this span of the job's progress.
const SCRAPE_SPAN: (f64, f64) = (0.1, 0.3);

/// Scrape posts, then derive the taxonomy from them.
pub async fn run_scraping_and_taxonomy(deps: &PipelineDeps, progress: &JobProgress) -> Result<()> {
    let (brand, range) = progress
        .read(|job| (job.brand_name.clone(), job.date_range()))
        .await;
    let range = range?;

    progress
        .apply(false, |job| {
            job.status = JobStatus::Scraping;
            job.error_message = None;
            job.update_progress("Starting scraping", SCRAPE_SPAN.0);
        })
        .await;

    let scaled = ScaledProgress::new(progress, SCRAPE_SPAN.0, SCRAPE_SPAN.1);
    let posts = deps.orchestrator.run(&brand, Some(&range), &scaled).await?;
    let count = posts.len();

    progress
        .apply(true, |job| {
            job.posts = posts;
            job.update_progress(format!("Scraping finished ({count} posts)"), SCRAPE_SPAN.1);
        })
        .await;
    if count == 0 {
        return Err(BrandPulseError::Precondition(format!("No results found for '{brand}'")).into());
    }

    progress
        .apply(false, |job| {
            job.status = JobStatus::Classifying;
            job.update_progress("Generating category key", 0.5);
        })
        .await;

    let texts = progress
        .read(|job| job.posts.iter().map(|p| p.text.clone()).collect::<Vec<_>>())
        .await;
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let taxonomy = deps.taxonomy.generate(&refs, &brand).await?;
    let aspects = taxonomy.aspects.len();

    progress
        .apply(true, |job| {
            job.taxonomy = Some(taxonomy);
            job.update_progress(format!("Category key ready ({aspects} aspects)"), 0.8);
        })
        .await;

    let done = progress
        .apply(true, |job| job.mark_completed("Scraping and category key complete"))
        .await;
    info!(job_id = %done.id, brand = brand.as_str(), posts = count, aspects, "Scraping workflow complete");
    Ok(())
}

/// Label every post of a job that already has posts and a taxonomy.
pub async fn run_classification(deps: &PipelineDeps, progress: &JobProgress) -> Result<()> {
    let (posts, taxonomy) = progress
        .read(|job| (job.posts.clone(), job.taxonomy.clone()))
        .await;
    let Some(taxonomy) = taxonomy else {
        return Err(BrandPulseError::Precondition("job has no category key".to_string()).into());
    };
    if posts.is_empty() {
        return Err(BrandPulseError::Precondition("job has no posts to classify".to_string()).into());
    }

    progress
        .apply(false, |job| {
            job.status = JobStatus::Classifying;
            job.error_message = None;
            job.update_progress("Classifying posts", 0.5);
        })
        .await;

    let results = deps
        .classifier
        .classify_all(&posts, &taxonomy, progress as &dyn ProgressSink)
        .await;
    let classified = results.len();

    let done = progress
        .apply(true, |job| {
            job.classifications = results;
            job.mark_completed("Classification complete");
        })
        .await;
    if classified == 0 {
        warn!(job_id = %done.id, "No posts could be classified");
    }
    info!(job_id = %done.id, posts = posts.len(), classified, "Classification workflow complete");
    Ok(())
}
