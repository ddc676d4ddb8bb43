pub mod artifact;
pub mod job;
pub mod metadata;
pub mod waveform;

pub use artifact::{Artifact, ArtifactOutcome, ArtifactPurpose};
pub use job::{JobStatus, MediaKind, UploadJob};
pub use metadata::MediaMetadata;
pub use waveform::WaveformSample;
