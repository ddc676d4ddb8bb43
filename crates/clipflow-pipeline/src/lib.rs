//! Upload job orchestration: the synchronous accept path, the background
//! processing phase behind the worker queue, job persistence, and the
//! caller-facing response shapes.

pub mod job_store;
pub mod orchestrator;
pub mod response;

pub use job_store::{JobStore, MemoryJobStore};
pub use orchestrator::MediaPipeline;
pub use response::{
    ArtifactStatusEntry, ErrorInfo, JobStatusResponse, MediaRecord, SubmitResponse,
};
