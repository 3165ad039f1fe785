use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use brandpulse_common::{ClassificationMap, Job};

use crate::store::JobStore;
use crate::traits::ProgressSink;

/// Progress sink bound to one live job. Every report mutates the shared job
/// under its lock and writes the snapshot through to the store.
pub struct JobProgress {
    job: Arc<Mutex<Job>>,
    store: Arc<dyn JobStore>,
}

impl JobProgress {
    pub fn new(job: Arc<Mutex<Job>>, store: Arc<dyn JobStore>) -> Self {
        Self { job, store }
    }

    /// Read from the job under its lock.
    pub async fn read<T>(&self, f: impl FnOnce(&Job) -> T) -> T {
        f(&*self.job.lock().await)
    }

    /// Mutate the job and write the snapshot. `durable` selects `persist`
    /// over `update`. Store failures are logged, not returned.
    pub async fn apply(&self, durable: bool, f: impl FnOnce(&mut Job)) -> Job {
        let snapshot = {
            let mut job = self.job.lock().await;
            f(&mut job);
            job.clone()
        };
        self.write(&snapshot, durable).await;
        snapshot
    }

    async fn write(&self, job: &Job, durable: bool) {
        let result = if durable {
            self.store.persist(job).await
        } else {
            self.store.update(job).await
        };
        if let Err(e) = result {
            warn!(job_id = %job.id, durable, error = %e, "Failed to save job snapshot");
        }
    }
}

#[async_trait]
impl ProgressSink for JobProgress {
    async fn report(&self, step: &str, fraction: f64) {
        self.apply(false, |job| job.update_progress(step, fraction)).await;
    }

    async fn checkpoint_classifications(&self, results: &ClassificationMap, durable: bool) {
        self.apply(durable, |job| {
            job.classifications = results.clone();
            job.updated_at = chrono::Utc::now();
        })
        .await;
    }
}

/// Maps a stage's own [0, 1] progress into a sub-span of the job's progress,
/// so nested stages never move the job's progress backwards.
pub struct ScaledProgress<'a> {
    inner: &'a dyn ProgressSink,
    start: f64,
    span: f64,
}

impl<'a> ScaledProgress<'a> {
    pub fn new(inner: &'a dyn ProgressSink, start: f64, end: f64) -> Self {
        Self {
            inner,
            start,
            span: end - start,
        }
    }
}

#[async_trait]
impl ProgressSink for ScaledProgress<'_> {
    async fn report(&self, step: &str, fraction: f64) {
        let fraction = self.start + fraction.clamp(0.0, 1.0) * self.span;
        self.inner.report(step, fraction).await;
    }

    async fn checkpoint_classifications(&self, results: &ClassificationMap, durable: bool) {
        self.inner.checkpoint_classifications(results, durable).await;
    }
}
