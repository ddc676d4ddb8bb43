//! Error taxonomy for the media pipeline.
//!
//! Validation-class errors surface synchronously to the caller; processing
//! errors are recorded per artifact and only fail the whole job when the
//! core rendition could not be produced. Every variant maps to a stable
//! machine-readable code via [`PipelineError::code`].

use std::time::Duration;

/// Maximum length in bytes for external-tool diagnostic text kept in job
/// records or responses. Anything longer is truncated before storage.
pub const MAX_DIAGNOSTIC_LEN: usize = 2000;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt or unreadable media: {0}")]
    CorruptOrUnreadable(String),

    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("Source has no audio track")]
    NoAudioTrack,

    #[error("Thumbnail generation failed ({size}): {detail}")]
    Thumbnail { size: String, detail: String },

    #[error("Transcode failed: {0}")]
    Transcode(String),

    #[error("Transcode timed out after {0:?}")]
    TranscodeTimeout(Duration),

    #[error("Audio extraction failed: {0}")]
    Extraction(String),

    #[error("Job stuck in processing, recovery sweep gave up")]
    OrphanedJob,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Stable machine-readable code, stored in job records and exposed to
    /// the caller.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::FileNotFound(_) => "file_not_found",
            PipelineError::TooLarge { .. } => "too_large",
            PipelineError::UnsupportedFormat(_) => "unsupported_format",
            PipelineError::CorruptOrUnreadable(_) => "corrupt_or_unreadable",
            PipelineError::Probe(_) => "probe_error",
            PipelineError::NoAudioTrack => "no_audio_track",
            PipelineError::Thumbnail { .. } => "thumbnail_failed",
            PipelineError::Transcode(_) => "transcode_failed",
            PipelineError::TranscodeTimeout(_) => "transcode_timeout",
            PipelineError::Extraction(_) => "extraction_failed",
            PipelineError::OrphanedJob => "orphaned_job",
            PipelineError::Storage(_) => "storage_error",
            PipelineError::Io(_) => "io_error",
        }
    }

    /// Validation-class errors reject the upload synchronously and are
    /// terminal for the job.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            PipelineError::FileNotFound(_)
                | PipelineError::TooLarge { .. }
                | PipelineError::UnsupportedFormat(_)
                | PipelineError::CorruptOrUnreadable(_)
                | PipelineError::Probe(_)
        )
    }

    /// Whether a background step failing with this error is worth retrying.
    /// Structural problems with the source never go away on retry; tool
    /// crashes, timeouts and IO hiccups might.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::Transcode(_)
                | PipelineError::TranscodeTimeout(_)
                | PipelineError::Extraction(_)
                | PipelineError::Storage(_)
                | PipelineError::Io(_)
        )
    }
}

/// Bound external-tool output before it is stored or logged. Truncation is
/// char-boundary safe.
pub fn truncate_diagnostic(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut end = max_len;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}… [truncated]", &text[..end])
}
