//! Job record persistence seam.
//!
//! The orchestrator is injected with a [`JobStore`] so the backing store
//! is swappable: the in-memory implementation here serves tests and
//! single-node deployments, and the surrounding application can provide a
//! durable one without touching the orchestrator.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use clipflow_core::models::{JobStatus, UploadJob};

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: UploadJob) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<UploadJob>>;

    /// Replace the stored record. Fails when the job was never inserted.
    async fn update(&self, job: UploadJob) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Jobs currently in `status`, for the recovery sweep.
    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<UploadJob>>;
}

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, UploadJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: UploadJob) -> Result<()> {
        self.jobs.write().await.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<UploadJob>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn update(&self, job: UploadJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if !jobs.contains_key(&job.id) {
            anyhow::bail!("Unknown job: {}", job.id);
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.jobs.write().await.remove(&id);
        Ok(())
    }

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<UploadJob>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect())
    }
}
