//! Job queue: bounded channel, worker pool, retry, and orphan reaper.
//!
//! Shutdown: [`JobQueue::shutdown`] signals the pool to stop claiming; it
//! does not wait for in-flight jobs. Already-spawned handlers run to
//! completion or time out inside their own external-tool watchdogs.

use anyhow::Result;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use uuid::Uuid;

use clipflow_core::PipelineError;

use crate::context::JobHandlerContext;

/// Caps exponential backoff so high retry counts do not produce
/// excessively long delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Bounded submission queue depth; senders wait when it is full, which is
/// the backpressure contract.
const QUEUE_DEPTH: usize = 256;

#[inline]
pub(crate) fn compute_retry_backoff_seconds(attempt: u32) -> u64 {
    2_u64.saturating_pow(attempt).min(MAX_RETRY_BACKOFF_SECS)
}

/// Non-pipeline errors are assumed transient; structural pipeline errors
/// are not retried.
pub(crate) fn is_recoverable(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<PipelineError>()
        .map(|e| e.is_recoverable())
        .unwrap_or(true)
}

#[derive(Clone)]
pub struct QueueConfig {
    pub max_workers: usize,
    pub max_retries: u32,
    /// Interval in seconds between orphan-recovery sweeps. 0 = disabled.
    pub reap_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            max_retries: 3,
            reap_interval_secs: 60,
        }
    }
}

pub struct JobQueue {
    submit_tx: mpsc::Sender<Uuid>,
    shutdown_tx: mpsc::Sender<()>,
}

impl JobQueue {
    /// Create the queue and spawn its worker pool. The context is held
    /// weakly so dropping the orchestrator tears the pool down.
    pub fn new(config: QueueConfig, context: Weak<dyn JobHandlerContext>) -> Self {
        let (submit_tx, submit_rx) = mpsc::channel(QUEUE_DEPTH);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(Self::worker_pool(config, context, submit_rx, shutdown_rx));

        Self {
            submit_tx,
            shutdown_tx,
        }
    }

    /// Enqueue one job for background processing. Waits when the queue is
    /// full; fails only after shutdown.
    pub async fn submit(&self, job_id: Uuid) -> Result<()> {
        self.submit_tx
            .send(job_id)
            .await
            .map_err(|_| anyhow::anyhow!("Job queue is shut down"))?;
        tracing::info!(job_id = %job_id, "Job submitted to queue");
        Ok(())
    }

    async fn worker_pool(
        config: QueueConfig,
        context: Weak<dyn JobHandlerContext>,
        mut submit_rx: mpsc::Receiver<Uuid>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(
            max_workers = config.max_workers,
            max_retries = config.max_retries,
            "Job queue worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers));

        // Orphan reaper (if interval > 0)
        let (reaper_shutdown_tx, mut reaper_shutdown_rx) = mpsc::channel::<()>(1);
        if config.reap_interval_secs > 0 {
            let reap_context = context.clone();
            let reap_interval = Duration::from_secs(config.reap_interval_secs);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(reap_interval);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            let Some(ctx) = reap_context.upgrade() else { break };
                            match ctx.recover_orphans().await {
                                Ok(0) => {}
                                Ok(recovered) => {
                                    tracing::info!(recovered, "Orphan sweep recovered stuck jobs");
                                }
                                Err(e) => {
                                    tracing::error!(error = %e, "Orphan sweep failed");
                                }
                            }
                        }
                        _ = reaper_shutdown_rx.recv() => break,
                    }
                }
            });
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Job queue worker pool shutting down");
                    let _ = reaper_shutdown_tx.send(()).await;
                    break;
                }
                job = submit_rx.recv() => {
                    let Some(job_id) = job else {
                        let _ = reaper_shutdown_tx.send(()).await;
                        break;
                    };
                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };
                    let ctx = context.clone();
                    let max_retries = config.max_retries;
                    tokio::spawn(async move {
                        let _permit = permit;
                        Self::process_with_retry(job_id, ctx, max_retries).await;
                    });
                }
            }
        }

        tracing::info!("Job queue worker pool stopped");
    }

    #[tracing::instrument(skip(context), fields(job_id = %job_id))]
    async fn process_with_retry(
        job_id: Uuid,
        context: Weak<dyn JobHandlerContext>,
        max_retries: u32,
    ) {
        let mut attempt = 0u32;
        loop {
            let Some(ctx) = context.upgrade() else {
                tracing::warn!("Handler context dropped, abandoning job");
                return;
            };

            match ctx.run_job(job_id).await {
                Ok(()) => {
                    tracing::info!(attempt, "Job processing finished");
                    return;
                }
                Err(error) => {
                    let recoverable = is_recoverable(&error);
                    tracing::error!(
                        error = %error,
                        attempt,
                        max_retries,
                        recoverable,
                        "Job processing failed"
                    );

                    if !recoverable || attempt >= max_retries {
                        ctx.job_failed(job_id, &error).await;
                        return;
                    }

                    let backoff = compute_retry_backoff_seconds(attempt);
                    tracing::info!(backoff_seconds = backoff, "Scheduling job retry");
                    drop(ctx);
                    sleep(Duration::from_secs(backoff)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Signal the pool to stop claiming new jobs. Returns immediately; it
    /// does not wait for in-flight jobs.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating job queue shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl Clone for JobQueue {
    fn clone(&self) -> Self {
        Self {
            submit_tx: self.submit_tx.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }
}
