//! Scheduled cleanup of the staging area.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::store::ArtifactStore;

pub struct CleanupService {
    store: Arc<ArtifactStore>,
    /// Staging files younger than this always survive a sweep.
    retention: Duration,
    sweep_interval: Duration,
}

impl CleanupService {
    pub fn new(store: Arc<ArtifactStore>, retention: Duration, sweep_interval: Duration) -> Self {
        Self {
            store,
            retention,
            sweep_interval,
        }
    }

    /// Start the periodic sweep. Returns a JoinHandle for shutdown.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = interval(self.sweep_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                match self.store.cleanup_staging(self.retention).await {
                    Ok(removed) => {
                        tracing::debug!(removed, "Staging cleanup sweep finished");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Staging cleanup sweep failed");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn sweep_task_removes_expired_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            ArtifactStore::new(dir.path(), "http://localhost:3000/media".to_string())
                .await
                .unwrap(),
        );
        let (_key, staged) = store
            .stage_bytes(Bytes::from_static(b"stale"), "mp4")
            .await
            .unwrap();

        let service = Arc::new(CleanupService::new(
            store,
            Duration::ZERO,
            Duration::from_millis(10),
        ));
        let handle = service.start();

        tokio::time::timeout(Duration::from_secs(5), async {
            while staged.exists() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("sweep never removed the stale file");
        handle.abort();
    }
}
