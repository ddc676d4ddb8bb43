use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use super::artifact::{ArtifactOutcome, ArtifactPurpose};
use super::waveform::WaveformSample;

/// Declared category of an uploaded file. Each kind has its own size
/// ceiling and extension allow-list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
    Image,
}

impl MediaKind {
    /// Directory name under the artifact root for this category.
    pub fn category_dir(&self) -> &'static str {
        match self {
            MediaKind::Video => "videos",
            MediaKind::Audio => "audio",
            MediaKind::Image => "images",
        }
    }
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Image => write!(f, "image"),
        }
    }
}

impl FromStr for MediaKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(MediaKind::Video),
            "audio" => Ok(MediaKind::Audio),
            "image" => Ok(MediaKind::Image),
            _ => Err(anyhow::anyhow!("Invalid media kind: {}", s)),
        }
    }
}

/// Job lifecycle states. `failed` is reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Validating,
    PlaceholderReady,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Legal forward transitions of the state machine.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Validating, JobStatus::PlaceholderReady) => true,
            (JobStatus::PlaceholderReady, JobStatus::Processing) => true,
            (JobStatus::Processing, JobStatus::Completed) => true,
            // A re-driven orphan goes back through processing.
            (JobStatus::Processing, JobStatus::Processing) => true,
            (state, JobStatus::Failed) => !state.is_terminal(),
            _ => false,
        }
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobStatus::Validating => write!(f, "validating"),
            JobStatus::PlaceholderReady => write!(f, "placeholder_ready"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validating" => Ok(JobStatus::Validating),
            "placeholder_ready" => Ok(JobStatus::PlaceholderReady),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// One submitted media file through its whole lifecycle, including the
/// per-artifact outcomes of the background phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: MediaKind,
    pub original_filename: String,
    /// Staged input path, relative to the artifact root.
    pub staged_key: String,
    pub file_size: i64,
    /// Measured by probe during validation.
    pub duration: Option<f64>,
    pub status: JobStatus,
    /// Machine-readable failure code when `status == Failed`.
    pub error: Option<String>,
    pub error_detail: Option<String>,
    pub artifacts: Vec<ArtifactOutcome>,
    /// Waveform points for audio sources, fixed length.
    pub waveform: Option<WaveformSample>,
    /// Background attempts so far (retries plus orphan re-drives).
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadJob {
    pub fn new(
        user_id: Uuid,
        kind: MediaKind,
        original_filename: String,
        staged_key: String,
        file_size: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            original_filename,
            staged_key,
            file_size,
            duration: None,
            status: JobStatus::Validating,
            error: None,
            error_detail: None,
            artifacts: Vec::new(),
            waveform: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record an artifact outcome, replacing any previous outcome for the
    /// same purpose (safe retries overwrite their own result).
    pub fn record_artifact(&mut self, outcome: ArtifactOutcome) {
        self.artifacts
            .retain(|a| a.purpose() != outcome.purpose());
        self.artifacts.push(outcome);
        self.updated_at = Utc::now();
    }

    pub fn artifact(&self, purpose: ArtifactPurpose) -> Option<&ArtifactOutcome> {
        self.artifacts.iter().find(|a| a.purpose() == purpose)
    }

    /// Transition to `next`, enforcing the state machine. Returns false and
    /// leaves the job untouched on an illegal transition.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }

    pub fn fail(&mut self, code: &str, detail: String) -> bool {
        if !self.transition(JobStatus::Failed) {
            return false;
        }
        self.error = Some(code.to_string());
        self.error_detail = Some(detail);
        true
    }
}
