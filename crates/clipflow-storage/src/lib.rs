//! Artifact store: category-partitioned local file tree with a stable
//! public-URL mapping, atomic publishes, a staging area for raw uploads,
//! and a scheduled cleanup sweep scoped to staging only.

pub mod cleanup;
pub mod store;

pub use cleanup::CleanupService;
pub use store::{ArtifactStore, PublishedFile, StorageError, StorageResult};
