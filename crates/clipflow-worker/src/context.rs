use async_trait::async_trait;
use uuid::Uuid;

/// Dispatch seam between the queue and the orchestrator. The queue holds
/// it weakly; when the context is gone the pool drains and stops.
#[async_trait]
pub trait JobHandlerContext: Send + Sync {
    /// Run the background phase for one job. An `Err` makes the queue
    /// retry (when the error is recoverable) or give up via
    /// [`job_failed`](Self::job_failed).
    async fn run_job(&self, job_id: Uuid) -> anyhow::Result<()>;

    /// Terminal failure: called once after retries are exhausted or the
    /// error is unrecoverable.
    async fn job_failed(&self, job_id: Uuid, error: &anyhow::Error);

    /// Recovery sweep for jobs stuck in processing. Returns how many jobs
    /// were re-driven or failed.
    async fn recover_orphans(&self) -> anyhow::Result<usize>;
}
