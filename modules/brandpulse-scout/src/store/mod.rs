pub mod file;

pub use file::JsonFileStore;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use brandpulse_common::Job;

/// Persistence for job records.
///
/// `save` and `persist` reach durable storage; `update` may only refresh the
/// working copy, so long-running stages call it freely and `persist` at
/// checkpoints.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Store a new job durably.
    async fn save(&self, job: &Job) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Job>>;

    /// Refresh the working copy of a job.
    async fn update(&self, job: &Job) -> Result<()>;

    /// Write the job's current snapshot to durable storage.
    async fn persist(&self, job: &Job) -> Result<()>;

    /// All jobs, newest first.
    async fn list(&self) -> Result<Vec<Job>>;

    /// Returns whether the job existed.
    async fn delete(&self, id: Uuid) -> Result<bool>;
}
