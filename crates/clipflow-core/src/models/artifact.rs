use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// What a derivative file is for. Doubles as the key of the job's
/// artifact set. Generated filenames embed the job id and the tag, and
/// thumbnails live in their own subdirectory, so no two artifacts ever
/// share a path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactPurpose {
    ThumbnailSmall,
    ThumbnailMedium,
    ThumbnailLarge,
    RenditionLow,
    RenditionMedium,
    RenditionHigh,
    Optimized,
    /// Standalone audio demuxed from a video source, produced on demand.
    AudioTrack,
    Waveform,
}

impl ArtifactPurpose {
    /// Filename-safe tag, used in generated storage names.
    pub fn tag(&self) -> &'static str {
        match self {
            ArtifactPurpose::ThumbnailSmall => "small",
            ArtifactPurpose::ThumbnailMedium => "medium",
            ArtifactPurpose::ThumbnailLarge => "large",
            ArtifactPurpose::RenditionLow => "low",
            ArtifactPurpose::RenditionMedium => "medium",
            ArtifactPurpose::RenditionHigh => "high",
            ArtifactPurpose::Optimized => "optimized",
            ArtifactPurpose::AudioTrack => "audio",
            ArtifactPurpose::Waveform => "waveform",
        }
    }

    pub fn is_thumbnail(&self) -> bool {
        matches!(
            self,
            ArtifactPurpose::ThumbnailSmall
                | ArtifactPurpose::ThumbnailMedium
                | ArtifactPurpose::ThumbnailLarge
        )
    }
}

impl Display for ArtifactPurpose {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ArtifactPurpose::ThumbnailSmall => write!(f, "thumbnail:small"),
            ArtifactPurpose::ThumbnailMedium => write!(f, "thumbnail:medium"),
            ArtifactPurpose::ThumbnailLarge => write!(f, "thumbnail:large"),
            ArtifactPurpose::RenditionLow => write!(f, "rendition:low"),
            ArtifactPurpose::RenditionMedium => write!(f, "rendition:medium"),
            ArtifactPurpose::RenditionHigh => write!(f, "rendition:high"),
            ArtifactPurpose::Optimized => write!(f, "optimized"),
            ArtifactPurpose::AudioTrack => write!(f, "audio"),
            ArtifactPurpose::Waveform => write!(f, "waveform"),
        }
    }
}

impl FromStr for ArtifactPurpose {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thumbnail:small" => Ok(ArtifactPurpose::ThumbnailSmall),
            "thumbnail:medium" => Ok(ArtifactPurpose::ThumbnailMedium),
            "thumbnail:large" => Ok(ArtifactPurpose::ThumbnailLarge),
            "rendition:low" => Ok(ArtifactPurpose::RenditionLow),
            "rendition:medium" => Ok(ArtifactPurpose::RenditionMedium),
            "rendition:high" => Ok(ArtifactPurpose::RenditionHigh),
            "optimized" => Ok(ArtifactPurpose::Optimized),
            "audio" => Ok(ArtifactPurpose::AudioTrack),
            "waveform" => Ok(ArtifactPurpose::Waveform),
            _ => Err(anyhow::anyhow!("Invalid artifact purpose: {}", s)),
        }
    }
}

/// One finalized derivative file plus its public locator. Owned
/// exclusively by the job that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub purpose: ArtifactPurpose,
    /// Path relative to the artifact root.
    pub storage_key: String,
    pub public_url: String,
    pub byte_size: i64,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

/// Per-artifact outcome of the background phase. A failed cosmetic
/// artifact never fails the job; the status record keeps both cases
/// explicit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ArtifactOutcome {
    Ready(Artifact),
    Failed {
        purpose: ArtifactPurpose,
        code: String,
        detail: String,
    },
}

impl ArtifactOutcome {
    pub fn purpose(&self) -> ArtifactPurpose {
        match self {
            ArtifactOutcome::Ready(a) => a.purpose,
            ArtifactOutcome::Failed { purpose, .. } => *purpose,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ArtifactOutcome::Ready(_))
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            ArtifactOutcome::Ready(a) => Some(a),
            ArtifactOutcome::Failed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purpose_round_trips_through_str() {
        for purpose in [
            ArtifactPurpose::ThumbnailSmall,
            ArtifactPurpose::ThumbnailMedium,
            ArtifactPurpose::ThumbnailLarge,
            ArtifactPurpose::RenditionLow,
            ArtifactPurpose::RenditionMedium,
            ArtifactPurpose::RenditionHigh,
            ArtifactPurpose::Optimized,
            ArtifactPurpose::AudioTrack,
            ArtifactPurpose::Waveform,
        ] {
            assert_eq!(
                purpose.to_string().parse::<ArtifactPurpose>().unwrap(),
                purpose
            );
        }
    }

    #[test]
    fn tags_are_filename_safe() {
        for purpose in [
            ArtifactPurpose::ThumbnailSmall,
            ArtifactPurpose::RenditionHigh,
            ArtifactPurpose::Optimized,
        ] {
            assert!(!purpose.tag().contains(':'));
            assert!(!purpose.tag().contains('/'));
        }
    }
}
