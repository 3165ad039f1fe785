use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use brandpulse_common::Job;

use super::JobStore;

/// Jobs as `job_<id>.json` files in one directory, fronted by an in-memory
/// cache holding at most one copy per job.
pub struct JsonFileStore {
    dir: PathBuf,
    cache: Mutex<HashMap<Uuid, Job>>,
}

impl JsonFileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating data dir {}", dir.display()))?;
        Ok(Self {
            dir,
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("job_{id}.json"))
    }

    async fn write_file(&self, job: &Job) -> Result<()> {
        let path = self.path_for(job.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(job).context("serializing job")?;
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("replacing {}", path.display()))?;
        debug!(job_id = %job.id, path = %path.display(), "Job persisted");
        Ok(())
    }

    async fn read_file(path: &Path) -> Result<Option<Job>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let job = serde_json::from_slice(&bytes)
                    .with_context(|| format!("parsing {}", path.display()))?;
                Ok(Some(job))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }
}

#[async_trait]
impl JobStore for JsonFileStore {
    async fn save(&self, job: &Job) -> Result<()> {
        let mut cache = self.cache.lock().await;
        cache.insert(job.id, job.clone());
        self.write_file(job).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>> {
        let mut cache = self.cache.lock().await;
        if let Some(job) = cache.get(&id) {
            return Ok(Some(job.clone()));
        }
        let loaded = Self::read_file(&self.path_for(id)).await?;
        if let Some(job) = &loaded {
            cache.insert(id, job.clone());
        }
        Ok(loaded)
    }

    async fn update(&self, job: &Job) -> Result<()> {
        self.cache.lock().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn persist(&self, job: &Job) -> Result<()> {
        let mut cache = self.cache.lock().await;
        cache.insert(job.id, job.clone());
        self.write_file(job).await
    }

    async fn list(&self) -> Result<Vec<Job>> {
        let cache = self.cache.lock().await;
        let mut jobs: HashMap<Uuid, Job> = HashMap::new();

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("listing {}", self.dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !(name.starts_with("job_") && name.ends_with(".json")) {
                continue;
            }
            match Self::read_file(&entry.path()).await {
                Ok(Some(job)) => {
                    jobs.insert(job.id, job);
                }
                Ok(None) => {}
                Err(e) => warn!(file = %name, error = %e, "Skipping unreadable job file"),
            }
        }
        for (id, job) in cache.iter() {
            jobs.insert(*id, job.clone());
        }

        let mut jobs: Vec<Job> = jobs.into_values().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut cache = self.cache.lock().await;
        let cached = cache.remove(&id).is_some();
        let on_disk = match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e).context("removing job file"),
        };
        Ok(cached || on_disk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brandpulse_common::{Classification, Sentiment};

    #[tokio::test]
    async fn save_then_get_from_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        let mut job = Job::new("Acme", "2025-01-01", "2025-02-01");
        job.classifications.insert(
            2,
            Classification { category: "Price".into(), sentiment: Sentiment::Positive, url: None },
        );
        store.save(&job).await.unwrap();

        let reopened = JsonFileStore::open(dir.path()).await.unwrap();
        let loaded = reopened.get(job.id).await.unwrap().unwrap();
        assert_eq!(loaded, job);
    }

    #[tokio::test]
    async fn update_is_not_durable_until_persist() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        let mut job = Job::new("Acme", "2025-01-01", "2025-02-01");
        store.save(&job).await.unwrap();

        job.update_progress("working", 0.4);
        store.update(&job).await.unwrap();
        assert_eq!(store.get(job.id).await.unwrap().unwrap().progress, 0.4);

        let reopened = JsonFileStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.get(job.id).await.unwrap().unwrap().progress, 0.0);

        store.persist(&job).await.unwrap();
        let reopened = JsonFileStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.get(job.id).await.unwrap().unwrap().progress, 0.4);
    }

    #[tokio::test]
    async fn list_merges_disk_and_cache_and_delete_reports() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        let a = Job::new("A", "2025-01-01", "2025-02-01");
        let b = Job::new("B", "2025-01-01", "2025-02-01");
        store.save(&a).await.unwrap();
        store.update(&b).await.unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), "ignore me").await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);

        assert!(store.delete(a.id).await.unwrap());
        assert!(!store.delete(a.id).await.unwrap());
        assert!(store.get(a.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_job_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }
}
