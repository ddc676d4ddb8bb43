//! The single seam over external media tools.
//!
//! The orchestrator, validator and tests depend on [`MediaEngine`], not on
//! ffmpeg being installed. [`FfmpegEngine`] is the production
//! implementation, composing the probe, thumbnail, waveform and transcode
//! plumbing in this crate.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use clipflow_core::models::{MediaMetadata, WaveformSample};
use clipflow_core::{PipelineConfig, PipelineError};

use crate::probe::Prober;
use crate::thumbnail::{ThumbnailGenerator, ThumbnailSpec};
use crate::transcoder::{TranscodeProfile, Transcoder};
use crate::waveform::WaveformExtractor;

#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Read-only metadata extraction.
    async fn probe(&self, path: &Path) -> Result<MediaMetadata, PipelineError>;

    /// Extract one still frame at the spec's dimensions.
    async fn extract_frame(
        &self,
        input: &Path,
        output: &Path,
        spec: &ThumbnailSpec,
    ) -> Result<(), PipelineError>;

    /// Fixed-length waveform for the audio track.
    async fn waveform(&self, input: &Path, points: usize)
        -> Result<WaveformSample, PipelineError>;

    /// Re-encode `input` to one profile.
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        profile: &TranscodeProfile,
        source: &MediaMetadata,
    ) -> Result<(), PipelineError>;

    /// Demux/re-encode the audio track of a video into a standalone file.
    async fn extract_audio(
        &self,
        input: &Path,
        output: &Path,
        max_duration_secs: f64,
        source: &MediaMetadata,
    ) -> Result<(), PipelineError>;
}

pub struct FfmpegEngine {
    prober: Prober,
    thumbnails: ThumbnailGenerator,
    waveforms: WaveformExtractor,
    transcoder: Transcoder,
}

impl FfmpegEngine {
    pub fn new(config: Arc<PipelineConfig>) -> Self {
        Self {
            prober: Prober::new(config.ffprobe_path.clone(), config.probe_timeout()),
            thumbnails: ThumbnailGenerator::new(
                config.ffmpeg_path.clone(),
                config.thumbnail_timeout(),
            ),
            waveforms: WaveformExtractor::new(config.ffmpeg_path.clone()),
            transcoder: Transcoder::new(config),
        }
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn probe(&self, path: &Path) -> Result<MediaMetadata, PipelineError> {
        self.prober.probe(path).await
    }

    async fn extract_frame(
        &self,
        input: &Path,
        output: &Path,
        spec: &ThumbnailSpec,
    ) -> Result<(), PipelineError> {
        self.thumbnails.extract_frame(input, output, spec).await
    }

    async fn waveform(
        &self,
        input: &Path,
        points: usize,
    ) -> Result<WaveformSample, PipelineError> {
        self.waveforms.extract(input, points).await
    }

    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        profile: &TranscodeProfile,
        source: &MediaMetadata,
    ) -> Result<(), PipelineError> {
        self.transcoder
            .optimize_for_delivery(input, output, profile, source)
            .await
    }

    async fn extract_audio(
        &self,
        input: &Path,
        output: &Path,
        max_duration_secs: f64,
        source: &MediaMetadata,
    ) -> Result<(), PipelineError> {
        self.transcoder
            .extract_audio(input, output, max_duration_secs, source)
            .await
    }
}
