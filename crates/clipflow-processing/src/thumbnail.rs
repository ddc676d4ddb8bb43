//! Still-frame thumbnail extraction.
//!
//! Each target size is an independent operation: a failure at one size is
//! reported for that size only and never blocks the others. The small
//! variant is the synchronous placeholder; the rest run in the background
//! phase.

use std::path::Path;
use std::time::Duration;

use clipflow_core::models::ArtifactPurpose;
use clipflow_core::PipelineError;

use crate::command::ToolCommand;

/// One target size for frame extraction.
#[derive(Debug, Clone, Copy)]
pub struct ThumbnailSpec {
    pub purpose: ArtifactPurpose,
    pub width: u32,
    pub height: u32,
}

/// Small first: it is the placeholder and must stay well under a second.
pub const THUMBNAIL_LADDER: [ThumbnailSpec; 3] = [
    ThumbnailSpec {
        purpose: ArtifactPurpose::ThumbnailSmall,
        width: 160,
        height: 90,
    },
    ThumbnailSpec {
        purpose: ArtifactPurpose::ThumbnailMedium,
        width: 480,
        height: 270,
    },
    ThumbnailSpec {
        purpose: ArtifactPurpose::ThumbnailLarge,
        width: 960,
        height: 540,
    },
];

/// The variant produced on the synchronous upload path.
pub fn placeholder_spec() -> ThumbnailSpec {
    THUMBNAIL_LADDER[0]
}

/// Sizes left for the background phase.
pub fn background_specs() -> &'static [ThumbnailSpec] {
    &THUMBNAIL_LADDER[1..]
}

/// Aspect-preserving cover: scale up to fill the box, then center-crop.
fn cover_filter(width: u32, height: u32) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}",
        w = width,
        h = height
    )
}

#[derive(Clone)]
pub struct ThumbnailGenerator {
    ffmpeg_path: String,
    timeout: Duration,
}

impl ThumbnailGenerator {
    pub fn new(ffmpeg_path: String, timeout: Duration) -> Self {
        Self {
            ffmpeg_path,
            timeout,
        }
    }

    /// Extract the first usable frame at the spec's dimensions into
    /// `output` (JPEG, inferred from the extension).
    #[tracing::instrument(skip(self, input, output), fields(purpose = %spec.purpose))]
    pub async fn extract_frame(
        &self,
        input: &Path,
        output: &Path,
        spec: &ThumbnailSpec,
    ) -> Result<(), PipelineError> {
        ToolCommand::new(&self.ffmpeg_path)
            .args(["-y", "-v", "error", "-i"])
            .arg_path(input)
            .args(["-frames:v", "1", "-vf"])
            .arg(cover_filter(spec.width, spec.height))
            .args(["-q:v", "4"])
            .arg_path(output)
            .timeout(self.timeout)
            .run()
            .await
            .map_err(|failure| PipelineError::Thumbnail {
                size: spec.purpose.to_string(),
                detail: failure.to_string(),
            })?;

        Ok(())
    }
}
