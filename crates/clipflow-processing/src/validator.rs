//! Upload policy enforcement.
//!
//! Checks run in order: existence/non-emptiness, category size ceiling,
//! extension allow-list, then a probe to prove the file decodes far enough
//! to report a duration. Duration itself is never a rejection ground; the
//! ceiling is consumed downstream as a trim instruction. Read-only.

use std::path::Path;
use std::sync::Arc;

use clipflow_core::models::{MediaKind, MediaMetadata};
use clipflow_core::{PipelineConfig, PipelineError};

use crate::engine::MediaEngine;

/// Cheap advisory signature check before probing. ffprobe stays the
/// authority; an unknown signature is only logged.
fn has_known_signature(header: &[u8]) -> bool {
    if header.len() < 12 {
        return false;
    }
    header.starts_with(b"RIFF")            // WAV / AVI
        || header.starts_with(b"OggS")     // OGG
        || header.starts_with(b"fLaC")     // FLAC
        || header.starts_with(b"ID3")      // MP3 with tag
        || header[0] == 0xFF && header[1] & 0xE0 == 0xE0 // raw MPEG audio frame
        || &header[4..8] == b"ftyp"        // MP4 / MOV / M4A
        || header.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) // Matroska / WebM
        || header.starts_with(&[0xFF, 0xD8, 0xFF])       // JPEG
        || header.starts_with(&[0x89, b'P', b'N', b'G']) // PNG
        || header.starts_with(b"GIF8")
}

pub struct UploadValidator {
    config: Arc<PipelineConfig>,
    engine: Arc<dyn MediaEngine>,
}

impl UploadValidator {
    pub fn new(config: Arc<PipelineConfig>, engine: Arc<dyn MediaEngine>) -> Self {
        Self { config, engine }
    }

    /// Validate a staged file against its declared category. Returns the
    /// probed metadata on acceptance; a typed rejection before any heavy
    /// work otherwise.
    #[tracing::instrument(skip(self, path), fields(filename = %original_filename, kind = %kind))]
    pub async fn validate(
        &self,
        path: &Path,
        original_filename: &str,
        kind: MediaKind,
    ) -> Result<MediaMetadata, PipelineError> {
        let file_meta = tokio::fs::metadata(path)
            .await
            .map_err(|_| PipelineError::FileNotFound(path.display().to_string()))?;

        if file_meta.len() == 0 {
            return Err(PipelineError::CorruptOrUnreadable("empty file".to_string()));
        }

        let ceiling = self.config.size_ceiling(kind);
        if file_meta.len() > ceiling {
            return Err(PipelineError::TooLarge {
                size: file_meta.len(),
                max: ceiling,
            });
        }

        let extension = Path::new(original_filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .ok_or_else(|| {
                PipelineError::UnsupportedFormat(format!("no extension: {}", original_filename))
            })?;

        if !self.config.allowed_extensions(kind).contains(&extension) {
            return Err(PipelineError::UnsupportedFormat(extension));
        }

        let header = read_header(path).await?;
        if !has_known_signature(&header) {
            tracing::debug!(
                extension = %extension,
                "No known media signature, deferring to probe"
            );
        }

        // A file that fails to decode is rejected regardless of how
        // correct its extension looks.
        let media = self.engine.probe(path).await?;

        if kind != MediaKind::Image && media.duration <= 0.0 {
            return Err(PipelineError::CorruptOrUnreadable(
                "no measurable duration".to_string(),
            ));
        }

        Ok(media)
    }
}

async fn read_header(path: &Path) -> Result<Vec<u8>, PipelineError> {
    use tokio::io::AsyncReadExt;
    let mut file = tokio::fs::File::open(path).await?;
    let mut header = vec![0u8; 16];
    let n = file.read(&mut header).await?;
    header.truncate(n);
    Ok(header)
}
