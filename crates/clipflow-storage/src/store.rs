//! Category-partitioned artifact storage on the local filesystem.
//!
//! Layout: `<root>/<category>/…` for finalized artifacts,
//! `<root>/staging/…` for raw uploads awaiting (or surviving past)
//! processing. Filenames embed job id and purpose, so concurrent writers
//! never share a name and writes need no locking. Publishes are atomic:
//! bytes land under a temp name in the destination directory, then a
//! rename makes them visible.

use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Storage operation errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A finalized file plus its public locator.
#[derive(Debug, Clone)]
pub struct PublishedFile {
    /// Key relative to the store root; stable once written.
    pub key: String,
    pub path: PathBuf,
    pub url: String,
    pub byte_size: i64,
}

#[derive(Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    base_url: String,
}

impl ArtifactStore {
    /// Create the store, making sure the root and staging directories
    /// exist.
    pub async fn new(root: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("staging")).await?;
        Ok(Self { root, base_url })
    }

    /// Reject keys that could escape the store root.
    fn checked_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.starts_with('/') || key.split('/').any(|part| part == "..") {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    /// Stage raw upload bytes under a unique name. Returns the staging key
    /// and its absolute path.
    pub async fn stage_bytes(&self, data: Bytes, extension: &str) -> StorageResult<(String, PathBuf)> {
        let key = format!("staging/{}.{}", Uuid::new_v4(), extension);
        let path = self.checked_path(&key)?;
        let mut file = fs::File::create(&path).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        Ok((key, path))
    }

    pub fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        self.checked_path(key)
    }

    /// Publish a locally produced file at `category/rel`. The source is
    /// copied under a temp name next to the destination, then renamed, so
    /// a reader never observes a partial file at the published path.
    #[tracing::instrument(skip(self, source), fields(category = %category, rel = %rel))]
    pub async fn write_file(
        &self,
        category: &str,
        rel: &str,
        source: &Path,
    ) -> StorageResult<PublishedFile> {
        let key = format!("{}/{}", category, rel);
        let dest = self.checked_path(&key)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp = dest.with_extension(format!("tmp-{}", Uuid::new_v4()));
        let byte_size = fs::copy(source, &tmp).await.map_err(|e| {
            StorageError::WriteFailed(format!("copy to {}: {}", tmp.display(), e))
        })?;
        if let Err(e) = fs::rename(&tmp, &dest).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StorageError::WriteFailed(format!(
                "rename to {}: {}",
                dest.display(),
                e
            )));
        }

        Ok(PublishedFile {
            url: self.public_url(&key),
            key,
            path: dest,
            byte_size: byte_size as i64,
        })
    }

    /// Publish in-memory bytes at `category/rel`, atomically.
    pub async fn write_bytes(
        &self,
        category: &str,
        rel: &str,
        data: Bytes,
    ) -> StorageResult<PublishedFile> {
        let key = format!("{}/{}", category, rel);
        let dest = self.checked_path(&key)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp = dest.with_extension(format!("tmp-{}", Uuid::new_v4()));
        let byte_size = data.len() as i64;
        {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(&data).await?;
            file.flush().await?;
        }
        if let Err(e) = fs::rename(&tmp, &dest).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StorageError::WriteFailed(format!(
                "rename to {}: {}",
                dest.display(),
                e
            )));
        }

        Ok(PublishedFile {
            url: self.public_url(&key),
            key,
            path: dest,
            byte_size,
        })
    }

    pub async fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.checked_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove staging files whose modification time exceeds the retention
    /// window. Finalized artifacts live outside `staging/` and are never
    /// touched; fresh staging files inside the window survive, so the
    /// sweep cannot race an in-flight write.
    #[tracing::instrument(skip(self))]
    pub async fn cleanup_staging(&self, older_than: Duration) -> StorageResult<usize> {
        let staging = self.root.join("staging");
        let mut removed = 0usize;
        let mut entries = fs::read_dir(&staging).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(_) => continue,
            };
            if !meta.is_file() {
                continue;
            }
            let expired = meta
                .modified()
                .ok()
                .and_then(|t| t.elapsed().ok())
                .map(|age| age >= older_than)
                .unwrap_or(false);
            if expired {
                if let Err(e) = fs::remove_file(entry.path()).await {
                    tracing::warn!(path = %entry.path().display(), error = %e, "Failed to remove stale staging file");
                } else {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            tracing::info!(removed, "Stale staging files removed");
        }
        Ok(removed)
    }
}
