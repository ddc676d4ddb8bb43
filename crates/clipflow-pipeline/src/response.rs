//! Caller-facing response shapes.
//!
//! The synchronous upload path answers with [`SubmitResponse`] before any
//! heavy processing runs; [`JobStatusResponse`] is the poll shape while
//! the background phase is in flight; [`MediaRecord`] is the durable
//! summary of a finished job.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use clipflow_core::models::{ArtifactPurpose, JobStatus, UploadJob};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    fn from_job(job: &UploadJob) -> Option<Self> {
        job.error.as_ref().map(|code| Self {
            code: code.clone(),
            message: job.error_detail.clone().unwrap_or_default(),
        })
    }
}

/// What the caller gets back immediately after upload: the job handle, a
/// placeholder to render, and an estimate for the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder_thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waveform: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl SubmitResponse {
    pub fn accepted(job: &UploadJob, estimated_seconds: u32) -> Self {
        let placeholder_thumbnail_url = job
            .artifact(ArtifactPurpose::ThumbnailSmall)
            .and_then(|o| o.artifact())
            .map(|a| a.public_url.clone());
        Self {
            job_id: job.id,
            status: job.status,
            placeholder_thumbnail_url,
            waveform: job.waveform.as_ref().map(|w| w.points.clone()),
            duration: job.duration,
            estimated_seconds: Some(estimated_seconds),
            error: None,
        }
    }

    pub fn rejected(job: &UploadJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            placeholder_thumbnail_url: None,
            waveform: None,
            duration: None,
            estimated_seconds: None,
            error: ErrorInfo::from_job(job),
        }
    }
}

/// One artifact's place in the poll response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactStatusEntry {
    pub purpose: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress_percent: u8,
    pub artifacts: Vec<ArtifactStatusEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl JobStatusResponse {
    pub fn from_job(job: &UploadJob, progress_percent: u8) -> Self {
        let artifacts = job
            .artifacts
            .iter()
            .map(|outcome| match outcome {
                clipflow_core::models::ArtifactOutcome::Ready(a) => ArtifactStatusEntry {
                    purpose: a.purpose.to_string(),
                    status: "ready".to_string(),
                    url: Some(a.public_url.clone()),
                    error: None,
                },
                clipflow_core::models::ArtifactOutcome::Failed { purpose, code, .. } => {
                    ArtifactStatusEntry {
                        purpose: purpose.to_string(),
                        status: "failed".to_string(),
                        url: None,
                        error: Some(code.clone()),
                    }
                }
            })
            .collect();

        Self {
            job_id: job.id,
            status: job.status,
            progress_percent,
            artifacts,
            duration: job.duration,
            error: ErrorInfo::from_job(job),
        }
    }
}

/// Durable summary of a finished job: every ready artifact's URL keyed by
/// purpose, plus the waveform for audio sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRecord {
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub urls: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waveform: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl MediaRecord {
    pub fn from_job(job: &UploadJob) -> Self {
        let urls = job
            .artifacts
            .iter()
            .filter_map(|o| o.artifact())
            .map(|a| (a.purpose.to_string(), a.public_url.clone()))
            .collect();
        Self {
            job_id: job.id,
            user_id: job.user_id,
            category: job.kind.category_dir().to_string(),
            duration: job.duration,
            urls,
            waveform: job.waveform.as_ref().map(|w| w.points.clone()),
            error: ErrorInfo::from_job(job),
        }
    }
}
