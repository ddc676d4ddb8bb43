//! Waveform visualization data for audio tracks.
//!
//! The audio is decoded to mono 8 kHz PCM, split into equal windows, and
//! each window's RMS energy becomes one point. The series is rescaled to
//! fill [0.1, 1.0]; silent or too-short sources yield a flat 0.5 sequence
//! of the configured length.

use std::path::Path;
use std::time::Duration;

use clipflow_core::models::WaveformSample;
use clipflow_core::PipelineError;

use crate::command::ToolCommand;

/// Decode rate for waveform extraction. Visualization needs no fidelity,
/// so a low mono rate keeps the decode fast even for the longest inputs.
const EXTRACT_SAMPLE_RATE: u32 = 8000;

/// Full decode at 8 kHz mono is cheap; this covers pathological inputs.
pub const WAVEFORM_TIMEOUT: Duration = Duration::from_secs(30);

/// RMS below this (on a 0..1 scale) counts as silence.
const SILENCE_FLOOR: f32 = 1e-4;

/// Downsample PCM into `points` normalized amplitudes.
pub fn compute_waveform(samples: &[i16], points: usize) -> WaveformSample {
    if points == 0 {
        return WaveformSample::new(Vec::new());
    }
    let window = samples.len() / points;
    if window == 0 {
        return WaveformSample::flat(points);
    }

    let mut rms: Vec<f32> = Vec::with_capacity(points);
    for i in 0..points {
        let chunk = &samples[i * window..(i + 1) * window];
        let energy: f64 = chunk
            .iter()
            .map(|s| {
                let v = *s as f64 / i16::MAX as f64;
                v * v
            })
            .sum();
        rms.push((energy / chunk.len() as f64).sqrt() as f32);
    }

    let peak = rms.iter().cloned().fold(0.0f32, f32::max);
    if peak < SILENCE_FLOOR {
        return WaveformSample::flat(points);
    }

    // Rescale so the loudest window hits 1.0 and nothing drops below 0.1.
    WaveformSample::new(rms.into_iter().map(|v| 0.1 + 0.9 * (v / peak)).collect())
}

#[derive(Clone)]
pub struct WaveformExtractor {
    ffmpeg_path: String,
    timeout: Duration,
}

impl WaveformExtractor {
    pub fn new(ffmpeg_path: String) -> Self {
        Self {
            ffmpeg_path,
            timeout: WAVEFORM_TIMEOUT,
        }
    }

    /// Decode the audio track and compute a fixed-length waveform.
    #[tracing::instrument(skip(self, input), fields(input = %input.display()))]
    pub async fn extract(
        &self,
        input: &Path,
        points: usize,
    ) -> Result<WaveformSample, PipelineError> {
        let output = ToolCommand::new(&self.ffmpeg_path)
            .args(["-v", "error", "-i"])
            .arg_path(input)
            .args(["-f", "s16le", "-acodec", "pcm_s16le", "-ac", "1", "-ar"])
            .arg(EXTRACT_SAMPLE_RATE.to_string())
            .arg("-")
            .timeout(self.timeout)
            .run()
            .await
            .map_err(|failure| PipelineError::Thumbnail {
                size: "waveform".to_string(),
                detail: failure.to_string(),
            })?;

        let samples: Vec<i16> = output
            .stdout
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Ok(compute_waveform(&samples, points))
    }
}
