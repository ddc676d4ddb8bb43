//! Read-only media inspection via ffprobe.
//!
//! Extracts duration, container, codec, dimensions and audio-stream
//! presence without decoding the payload. A probe that cannot run is a
//! `probe_error`; a probe that runs and rejects the file means the file is
//! corrupt or not media at all.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use clipflow_core::models::MediaMetadata;
use clipflow_core::PipelineError;

use crate::command::{ToolCommand, ToolFailure};

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    streams: Option<Vec<FfprobeStream>>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    duration: Option<String>,
}

#[derive(Clone)]
pub struct Prober {
    ffprobe_path: String,
    timeout: Duration,
}

impl Prober {
    pub fn new(ffprobe_path: String, timeout: Duration) -> Self {
        Self {
            ffprobe_path,
            timeout,
        }
    }

    /// Probe a file for [`MediaMetadata`].
    #[tracing::instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn probe(&self, path: &Path) -> Result<MediaMetadata, PipelineError> {
        let output = ToolCommand::new(&self.ffprobe_path)
            .args(["-v", "error", "-show_format", "-show_streams", "-of", "json"])
            .arg_path(path)
            .timeout(self.timeout)
            .run()
            .await
            .map_err(|failure| match failure {
                // The tool ran and rejected the file: not decodable media.
                ToolFailure::NonZero { stderr, .. } => PipelineError::CorruptOrUnreadable(stderr),
                other => PipelineError::Probe(other.to_string()),
            })?;

        parse_ffprobe_json(&output.stdout)
    }
}

fn parse_ffprobe_json(stdout: &[u8]) -> Result<MediaMetadata, PipelineError> {
    let parsed: FfprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| PipelineError::Probe(format!("unparseable ffprobe output: {}", e)))?;

    let format = parsed.format;
    let streams = parsed.streams.unwrap_or_default();

    let video_stream = streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let audio_stream = streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    // Containers like raw ADTS report duration only on the stream.
    let duration = format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            streams
                .iter()
                .filter_map(|s| s.duration.as_ref()?.parse::<f64>().ok())
                .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))))
        })
        .unwrap_or(0.0);

    let codec = video_stream
        .or(audio_stream)
        .and_then(|s| s.codec_name.clone());

    Ok(MediaMetadata {
        duration,
        container: format
            .as_ref()
            .and_then(|f| f.format_name.clone())
            .unwrap_or_else(|| "unknown".to_string()),
        codec,
        width: video_stream.and_then(|s| s.width),
        height: video_stream.and_then(|s| s.height),
        sample_rate: audio_stream
            .and_then(|s| s.sample_rate.as_ref())
            .and_then(|sr| sr.parse().ok()),
        channels: audio_stream.and_then(|s| s.channels),
        has_audio: audio_stream.is_some(),
        bitrate: format
            .as_ref()
            .and_then(|f| f.bit_rate.as_ref())
            .and_then(|b| b.parse().ok()),
    })
}
