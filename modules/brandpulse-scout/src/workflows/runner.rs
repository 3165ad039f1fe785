use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use brandpulse_common::{BrandPulseError, ClassificationMap, Job, JobStatus};

use super::progress::JobProgress;
use super::validate::validate_request;
use super::{run_classification, run_scraping_and_taxonomy, PipelineDeps};
use crate::pipeline::report::Report;
use crate::store::JobStore;

/// How a background task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed,
    Failed(String),
    /// Never started because the runner shut down first.
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Workflow {
    ScrapeAndTaxonomy,
    Classification,
}

impl Workflow {
    fn name(self) -> &'static str {
        match self {
            Workflow::ScrapeAndTaxonomy => "scrape_and_taxonomy",
            Workflow::Classification => "classification",
        }
    }
}

/// Acknowledgement for a submitted job. Dropping it detaches the task.
pub struct JobHandle {
    pub job_id: Uuid,
    task: JoinHandle<TaskOutcome>,
}

impl JobHandle {
    pub async fn wait(self) -> TaskOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => TaskOutcome::Failed(format!("task aborted: {e}")),
        }
    }
}

/// Runs whole workflows in the background, at most `workers` at a time.
///
/// Submissions return immediately; progress is read back from the store.
/// A started workflow always runs to completion. `shutdown` only stops
/// queued ones from starting.
pub struct JobRunner {
    deps: Arc<PipelineDeps>,
    store: Arc<dyn JobStore>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl JobRunner {
    pub fn new(deps: PipelineDeps, store: Arc<dyn JobStore>, workers: usize) -> Self {
        Self {
            deps: Arc::new(deps),
            store,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Token cancelled by `shutdown`. Queued tasks observe it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        info!("Job runner shutting down, queued jobs will be abandoned");
        self.shutdown.cancel();
    }

    /// Validate the request, create the job and queue scraping plus taxonomy
    /// generation for it.
    pub async fn submit_scrape(&self, brand: &str, start: &str, end: &str) -> Result<JobHandle, BrandPulseError> {
        let request = validate_request(brand, start, end)?;
        let job = Job::new(request.brand, request.start_date, request.end_date);
        self.store.save(&job).await?;
        info!(job_id = %job.id, brand = job.brand_name.as_str(), "Scraping job submitted");
        Ok(self.spawn(job, Workflow::ScrapeAndTaxonomy))
    }

    /// Queue classification for an existing job. Earlier results are cleared
    /// first. The job needs posts and a taxonomy.
    pub async fn submit_classification(&self, id: Uuid) -> Result<JobHandle, BrandPulseError> {
        let job = self
            .store
            .get(id)
            .await?
            .ok_or(BrandPulseError::JobNotFound(id))?;
        if matches!(job.status, JobStatus::Scraping | JobStatus::Classifying) {
            return Err(BrandPulseError::Precondition(format!("job {id} is still running")));
        }
        if job.posts.is_empty() {
            return Err(BrandPulseError::Precondition("no posts to classify".to_string()));
        }
        if job.taxonomy.is_none() {
            return Err(BrandPulseError::Precondition(
                "generate the category key before classifying".to_string(),
            ));
        }

        let job = self.reset_classification(id).await?;
        info!(job_id = %id, posts = job.posts.len(), "Classification job submitted");
        Ok(self.spawn(job, Workflow::Classification))
    }

    /// Drop all classification results of a job.
    pub async fn reset_classification(&self, id: Uuid) -> Result<Job, BrandPulseError> {
        let mut job = self
            .store
            .get(id)
            .await?
            .ok_or(BrandPulseError::JobNotFound(id))?;
        job.classifications = ClassificationMap::new();
        job.updated_at = chrono::Utc::now();
        self.store.persist(&job).await?;
        Ok(job)
    }

    /// Write the narrative report for a classified job. Runs in the
    /// foreground; nothing is stored.
    pub async fn generate_report(&self, id: Uuid) -> anyhow::Result<Report> {
        let job = self
            .store
            .get(id)
            .await?
            .ok_or(BrandPulseError::JobNotFound(id))?;
        if matches!(job.status, JobStatus::Scraping | JobStatus::Classifying) {
            return Err(BrandPulseError::Precondition(format!("job {id} is still running")).into());
        }
        self.deps.report.generate(&job).await
    }

    fn spawn(&self, job: Job, workflow: Workflow) -> JobHandle {
        let job_id = job.id;
        let deps = self.deps.clone();
        let store = self.store.clone();
        let permits = self.permits.clone();
        let shutdown = self.shutdown.clone();

        let task = tokio::spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                permit = permits.acquire_owned() => permit.ok(),
            };
            let job = Arc::new(Mutex::new(job));
            let progress = JobProgress::new(job, store);

            if permit.is_none() {
                warn!(job_id = %job_id, workflow = workflow.name(), "Job abandoned before start");
                progress
                    .apply(true, |job| job.mark_failed("Abandoned: service shut down before the job started"))
                    .await;
                return TaskOutcome::Abandoned;
            }

            info!(job_id = %job_id, workflow = workflow.name(), "Job started");
            let result = match workflow {
                Workflow::ScrapeAndTaxonomy => run_scraping_and_taxonomy(&deps, &progress).await,
                Workflow::Classification => run_classification(&deps, &progress).await,
            };

            match result {
                Ok(()) => TaskOutcome::Completed,
                Err(e) => {
                    let message = format!("{e:#}");
                    error!(job_id = %job_id, workflow = workflow.name(), error = message.as_str(), "Job failed");
                    progress.apply(true, |job| job.mark_failed(message.clone())).await;
                    TaskOutcome::Failed(message)
                }
            }
        });

        JobHandle { job_id, task }
    }
}
