//! Re-encoding to delivery profiles.
//!
//! Encodes are constant-quality (CRF) rather than fixed-bitrate, always
//! enable faststart layout so partial downloads play, downsample audio
//! toward the canonical rate (never upsample), and preserve the source
//! channel layout. A source longer than the profile's ceiling is trimmed
//! to the ceiling, never rejected. Outputs are deterministic per
//! (source, profile): re-running overwrites the same path, so any step can
//! be retried safely.

use std::path::Path;
use std::sync::Arc;

use clipflow_core::config::CANONICAL_SAMPLE_RATE;
use clipflow_core::models::{ArtifactPurpose, MediaMetadata};
use clipflow_core::{PipelineConfig, PipelineError};

use crate::command::{ToolCommand, ToolFailure};

/// What a profile encodes to.
#[derive(Debug, Clone, Copy)]
pub enum ProfileKind {
    Video { width: u32, height: u32, crf: u8 },
    Audio { bitrate_kbps: u32 },
    Image { max_width: u32, quality: u8 },
}

/// One target codec/quality/resolution/duration envelope.
#[derive(Debug, Clone)]
pub struct TranscodeProfile {
    pub purpose: ArtifactPurpose,
    pub kind: ProfileKind,
    /// Duration ceiling in seconds; sources beyond it are trimmed.
    pub max_duration_secs: f64,
    pub extension: &'static str,
    pub content_type: &'static str,
}

impl TranscodeProfile {
    /// The single mobile-optimized rendition, the core artifact for video.
    pub fn optimized_video(max_duration_secs: f64) -> Self {
        Self {
            purpose: ArtifactPurpose::Optimized,
            kind: ProfileKind::Video {
                width: 854,
                height: 480,
                crf: 26,
            },
            max_duration_secs,
            extension: "mp4",
            content_type: "video/mp4",
        }
    }

    /// Multi-quality streaming ladder, low to high.
    pub fn ladder(max_duration_secs: f64) -> Vec<Self> {
        let rungs = [
            (ArtifactPurpose::RenditionLow, 480u32, 270u32, 30u8),
            (ArtifactPurpose::RenditionMedium, 854, 480, 26),
            (ArtifactPurpose::RenditionHigh, 1280, 720, 23),
        ];
        rungs
            .into_iter()
            .map(|(purpose, width, height, crf)| Self {
                purpose,
                kind: ProfileKind::Video { width, height, crf },
                max_duration_secs,
                extension: "mp4",
                content_type: "video/mp4",
            })
            .collect()
    }

    /// Audio normalization target: AAC in M4A, channel layout preserved.
    pub fn optimized_audio(max_duration_secs: f64) -> Self {
        Self {
            purpose: ArtifactPurpose::Optimized,
            kind: ProfileKind::Audio { bitrate_kbps: 128 },
            max_duration_secs,
            extension: "m4a",
            content_type: "audio/mp4",
        }
    }

    /// Delivery copy for still images: bounded width, re-encoded JPEG.
    pub fn optimized_image() -> Self {
        Self {
            purpose: ArtifactPurpose::Optimized,
            kind: ProfileKind::Image {
                max_width: 1280,
                quality: 4,
            },
            max_duration_secs: 0.0,
            extension: "jpg",
            content_type: "image/jpeg",
        }
    }
}

/// Duration the output will actually have once the trim policy applies.
pub fn effective_duration(source_secs: f64, max_secs: f64) -> f64 {
    if max_secs > 0.0 && source_secs > max_secs {
        max_secs
    } else {
        source_secs
    }
}

#[derive(Clone)]
pub struct Transcoder {
    ffmpeg_path: String,
    config: Arc<PipelineConfig>,
}

impl Transcoder {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            config,
        }
    }

    /// Single-pass re-encode of `input` to `profile`, writing `output`.
    #[tracing::instrument(skip(self, input, output, source), fields(purpose = %profile.purpose))]
    pub async fn optimize_for_delivery(
        &self,
        input: &Path,
        output: &Path,
        profile: &TranscodeProfile,
        source: &MediaMetadata,
    ) -> Result<(), PipelineError> {
        let args = build_args(profile, source, input, output);
        self.run_encode(args, source.duration).await?;
        self.reject_empty_output(output).await
    }

    /// Demux and re-encode the audio track of a video into a standalone
    /// audio file. Short-circuits when the probe saw no audio stream.
    #[tracing::instrument(skip(self, input, output, source))]
    pub async fn extract_audio(
        &self,
        input: &Path,
        output: &Path,
        max_duration_secs: f64,
        source: &MediaMetadata,
    ) -> Result<(), PipelineError> {
        if !source.has_audio {
            return Err(PipelineError::NoAudioTrack);
        }

        let profile = TranscodeProfile::optimized_audio(max_duration_secs);
        let args = build_args(&profile, source, input, output);
        self.run_encode(args, source.duration).await?;
        self.reject_empty_output(output)
            .await
            .map_err(|_| PipelineError::Extraction("encoder produced empty output".to_string()))
    }

    async fn run_encode(&self, args: Vec<String>, source_duration: f64) -> Result<(), PipelineError> {
        ToolCommand::new(&self.ffmpeg_path)
            .args(args)
            .timeout(self.config.transcode_timeout(source_duration))
            .run()
            .await
            .map_err(|failure| match failure {
                ToolFailure::TimedOut { timeout, .. } => PipelineError::TranscodeTimeout(timeout),
                other => PipelineError::Transcode(other.to_string()),
            })?;
        Ok(())
    }

    async fn reject_empty_output(&self, output: &Path) -> Result<(), PipelineError> {
        let size = tokio::fs::metadata(output).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(PipelineError::Transcode(
                "encoder produced empty output".to_string(),
            ));
        }
        Ok(())
    }
}

/// Build the full ffmpeg argument list for a profile. Kept separate from
/// the runner so the encode contract is unit-testable without ffmpeg.
pub(crate) fn build_args(
    profile: &TranscodeProfile,
    source: &MediaMetadata,
    input: &Path,
    output: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-v".into(),
        "error".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
    ];

    match profile.kind {
        ProfileKind::Video { width, height, crf } => {
            args.extend([
                "-c:v".into(),
                "libx264".into(),
                "-preset".into(),
                "fast".into(),
                "-crf".into(),
                crf.to_string(),
                "-vf".into(),
                format!(
                    "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}",
                    w = width,
                    h = height
                ),
                "-movflags".into(),
                "+faststart".into(),
            ]);
            if source.has_audio {
                args.extend(["-c:a".into(), "aac".into(), "-b:a".into(), "128k".into()]);
                push_sample_rate(&mut args, source);
            } else {
                args.push("-an".into());
            }
        }
        ProfileKind::Audio { bitrate_kbps } => {
            args.extend([
                "-vn".into(),
                "-c:a".into(),
                "aac".into(),
                "-b:a".into(),
                format!("{}k", bitrate_kbps),
                "-movflags".into(),
                "+faststart".into(),
            ]);
            push_sample_rate(&mut args, source);
        }
        ProfileKind::Image { max_width, quality } => {
            args.extend([
                "-frames:v".into(),
                "1".into(),
                "-vf".into(),
                // Bound the width, keep aspect, keep even dimensions.
                format!("scale=min(iw\\,{}):-2", max_width),
                "-q:v".into(),
                quality.to_string(),
            ]);
        }
    }

    // Trim, never reject: the ceiling is an instruction, not a check.
    if !matches!(profile.kind, ProfileKind::Image { .. })
        && profile.max_duration_secs > 0.0
        && source.duration > profile.max_duration_secs
    {
        args.extend(["-t".into(), format!("{}", profile.max_duration_secs)]);
    }

    args.push(output.to_string_lossy().into_owned());
    args
}

/// Downsample toward the canonical rate; never upsample, and leave the
/// channel layout alone.
fn push_sample_rate(args: &mut Vec<String>, source: &MediaMetadata) {
    if let Some(rate) = source.sample_rate {
        if rate > CANONICAL_SAMPLE_RATE {
            args.extend(["-ar".into(), CANONICAL_SAMPLE_RATE.to_string()]);
        }
    }
}
