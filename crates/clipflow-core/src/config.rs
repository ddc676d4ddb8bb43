//! Environment-derived pipeline configuration.
//!
//! Size/duration ceilings, tool paths, timeouts and worker counts are
//! externally supplied constants; everything has a sensible default so the
//! pipeline runs with an empty environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::models::MediaKind;

const DEFAULT_MAX_AUDIO_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_VIDEO_BYTES: u64 = 100 * 1024 * 1024;
const DEFAULT_MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_DURATION_SECS: f64 = 60.0;
const DEFAULT_WAVEFORM_POINTS: usize = 20;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_THUMBNAIL_TIMEOUT_SECS: u64 = 5;
const DEFAULT_TRANSCODE_TIMEOUT_BASE_SECS: u64 = 120;
const DEFAULT_MAX_WORKERS: usize = 4;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_STAGING_RETENTION_SECS: u64 = 3600;
const DEFAULT_ORPHAN_GRACE_SECS: u64 = 1800;

/// Audio outputs never exceed this sample rate; lower source rates are
/// kept as-is (downsample only, never upsample).
pub const CANONICAL_SAMPLE_RATE: u32 = 44_100;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_list_or(key: &str, default: &[&str]) -> Vec<String> {
    env::var(key)
        .ok()
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_else(|| default.iter().map(|s| s.to_string()).collect())
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// Root of the artifact tree; staging lives under `<root>/staging`.
    pub artifact_root: PathBuf,
    /// Base URL the surrounding application serves artifacts from.
    pub public_base_url: String,
    pub max_audio_bytes: u64,
    pub max_video_bytes: u64,
    pub max_image_bytes: u64,
    /// Duration ceiling in seconds. Exceeding it is a trim instruction for
    /// the transcoder, never a rejection.
    pub max_duration_secs: f64,
    pub waveform_points: usize,
    pub audio_allowed_extensions: Vec<String>,
    pub video_allowed_extensions: Vec<String>,
    pub image_allowed_extensions: Vec<String>,
    pub probe_timeout_secs: u64,
    pub thumbnail_timeout_secs: u64,
    pub transcode_timeout_base_secs: u64,
    pub max_workers: usize,
    pub max_retries: u32,
    pub staging_retention_secs: u64,
    pub orphan_grace_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            artifact_root: PathBuf::from("./media"),
            public_base_url: "http://localhost:3000/media".to_string(),
            max_audio_bytes: DEFAULT_MAX_AUDIO_BYTES,
            max_video_bytes: DEFAULT_MAX_VIDEO_BYTES,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            waveform_points: DEFAULT_WAVEFORM_POINTS,
            audio_allowed_extensions: ["mp3", "wav", "ogg", "m4a", "flac", "aac"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            video_allowed_extensions: ["mp4", "webm", "mov", "avi", "mkv", "m4v"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            image_allowed_extensions: ["jpg", "jpeg", "png", "gif", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            thumbnail_timeout_secs: DEFAULT_THUMBNAIL_TIMEOUT_SECS,
            transcode_timeout_base_secs: DEFAULT_TRANSCODE_TIMEOUT_BASE_SECS,
            max_workers: DEFAULT_MAX_WORKERS,
            max_retries: DEFAULT_MAX_RETRIES,
            staging_retention_secs: DEFAULT_STAGING_RETENTION_SECS,
            orphan_grace_secs: DEFAULT_ORPHAN_GRACE_SECS,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            ffmpeg_path: env::var("CLIPFLOW_FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: env::var("CLIPFLOW_FFPROBE_PATH").unwrap_or(defaults.ffprobe_path),
            artifact_root: env::var("CLIPFLOW_ARTIFACT_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.artifact_root),
            public_base_url: env::var("CLIPFLOW_PUBLIC_BASE_URL")
                .unwrap_or(defaults.public_base_url),
            max_audio_bytes: env_or("CLIPFLOW_MAX_AUDIO_BYTES", DEFAULT_MAX_AUDIO_BYTES),
            max_video_bytes: env_or("CLIPFLOW_MAX_VIDEO_BYTES", DEFAULT_MAX_VIDEO_BYTES),
            max_image_bytes: env_or("CLIPFLOW_MAX_IMAGE_BYTES", DEFAULT_MAX_IMAGE_BYTES),
            max_duration_secs: env_or("CLIPFLOW_MAX_DURATION_SECS", DEFAULT_MAX_DURATION_SECS),
            waveform_points: env_or("CLIPFLOW_WAVEFORM_POINTS", DEFAULT_WAVEFORM_POINTS),
            audio_allowed_extensions: env_list_or(
                "CLIPFLOW_AUDIO_EXTENSIONS",
                &["mp3", "wav", "ogg", "m4a", "flac", "aac"],
            ),
            video_allowed_extensions: env_list_or(
                "CLIPFLOW_VIDEO_EXTENSIONS",
                &["mp4", "webm", "mov", "avi", "mkv", "m4v"],
            ),
            image_allowed_extensions: env_list_or(
                "CLIPFLOW_IMAGE_EXTENSIONS",
                &["jpg", "jpeg", "png", "gif", "webp"],
            ),
            probe_timeout_secs: env_or("CLIPFLOW_PROBE_TIMEOUT_SECS", DEFAULT_PROBE_TIMEOUT_SECS),
            thumbnail_timeout_secs: env_or(
                "CLIPFLOW_THUMBNAIL_TIMEOUT_SECS",
                DEFAULT_THUMBNAIL_TIMEOUT_SECS,
            ),
            transcode_timeout_base_secs: env_or(
                "CLIPFLOW_TRANSCODE_TIMEOUT_SECS",
                DEFAULT_TRANSCODE_TIMEOUT_BASE_SECS,
            ),
            max_workers: env_or("CLIPFLOW_MAX_WORKERS", DEFAULT_MAX_WORKERS),
            max_retries: env_or("CLIPFLOW_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            staging_retention_secs: env_or(
                "CLIPFLOW_STAGING_RETENTION_SECS",
                DEFAULT_STAGING_RETENTION_SECS,
            ),
            orphan_grace_secs: env_or("CLIPFLOW_ORPHAN_GRACE_SECS", DEFAULT_ORPHAN_GRACE_SECS),
        };

        if config.waveform_points == 0 {
            anyhow::bail!("CLIPFLOW_WAVEFORM_POINTS must be greater than zero");
        }
        if config.max_workers == 0 {
            anyhow::bail!("CLIPFLOW_MAX_WORKERS must be greater than zero");
        }
        if config.max_duration_secs <= 0.0 {
            anyhow::bail!("CLIPFLOW_MAX_DURATION_SECS must be positive");
        }

        Ok(config)
    }

    pub fn size_ceiling(&self, kind: MediaKind) -> u64 {
        match kind {
            MediaKind::Audio => self.max_audio_bytes,
            MediaKind::Video => self.max_video_bytes,
            MediaKind::Image => self.max_image_bytes,
        }
    }

    pub fn allowed_extensions(&self, kind: MediaKind) -> &[String] {
        match kind {
            MediaKind::Audio => &self.audio_allowed_extensions,
            MediaKind::Video => &self.video_allowed_extensions,
            MediaKind::Image => &self.image_allowed_extensions,
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn thumbnail_timeout(&self) -> Duration {
        Duration::from_secs(self.thumbnail_timeout_secs)
    }

    /// Transcode watchdog, scaled conservatively to input duration so a
    /// long encode gets headroom but a hang still dies.
    pub fn transcode_timeout(&self, source_duration_secs: f64) -> Duration {
        let scaled = self.transcode_timeout_base_secs as f64 + 2.0 * source_duration_secs.max(0.0);
        Duration::from_secs(scaled.ceil() as u64)
    }

    pub fn staging_retention(&self) -> Duration {
        Duration::from_secs(self.staging_retention_secs)
    }

    pub fn orphan_grace(&self) -> Duration {
        Duration::from_secs(self.orphan_grace_secs)
    }
}
