//! Upload orchestration: the synchronous accept path and the background
//! processing phase.
//!
//! `submit` stays fast: stage the bytes, validate, produce the cheap
//! placeholder (small thumbnail or waveform), enqueue, answer. Everything
//! expensive runs behind the job queue, which calls back in through
//! [`JobHandlerContext`]. Per-artifact failures of cosmetic outputs are
//! recorded and skipped; only a failed core rendition fails the job.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::path::Path;
use std::sync::{Arc, OnceLock, Weak};
use uuid::Uuid;

use clipflow_core::models::{
    Artifact, ArtifactOutcome, ArtifactPurpose, JobStatus, MediaKind, MediaMetadata, UploadJob,
    WaveformSample,
};
use clipflow_core::{truncate_diagnostic, PipelineConfig, PipelineError, MAX_DIAGNOSTIC_LEN};
use clipflow_processing::thumbnail::{background_specs, placeholder_spec, ThumbnailSpec};
use clipflow_processing::{MediaEngine, TranscodeProfile, UploadValidator};
use clipflow_storage::ArtifactStore;
use clipflow_worker::{JobHandlerContext, JobQueue, QueueConfig};

use crate::job_store::JobStore;
use crate::response::{JobStatusResponse, MediaRecord, SubmitResponse};

/// Strip path components and shell-hostile characters from a client
/// supplied name. Only used for records and extension detection; storage
/// names are always generated.
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(128)
        .collect();
    if cleaned.chars().all(|c| matches!(c, '.' | '_')) {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Rough wall-clock estimate for the background phase, in seconds.
fn estimate_seconds(duration_secs: f64) -> u32 {
    (4.0 + duration_secs / 2.0).ceil().clamp(5.0, 120.0) as u32
}

/// Everything the background phase is expected to decide for a category.
/// Progress is the share of these with a recorded outcome, ready or not.
fn planned_purposes(kind: MediaKind) -> &'static [ArtifactPurpose] {
    match kind {
        MediaKind::Video => &[
            ArtifactPurpose::Optimized,
            ArtifactPurpose::ThumbnailSmall,
            ArtifactPurpose::ThumbnailMedium,
            ArtifactPurpose::ThumbnailLarge,
            ArtifactPurpose::RenditionLow,
            ArtifactPurpose::RenditionMedium,
            ArtifactPurpose::RenditionHigh,
        ],
        MediaKind::Audio => &[ArtifactPurpose::Optimized, ArtifactPurpose::Waveform],
        MediaKind::Image => &[
            ArtifactPurpose::Optimized,
            ArtifactPurpose::ThumbnailSmall,
            ArtifactPurpose::ThumbnailMedium,
            ArtifactPurpose::ThumbnailLarge,
        ],
    }
}

fn progress_percent(job: &UploadJob) -> u8 {
    if job.status.is_terminal() {
        return 100;
    }
    let planned = planned_purposes(job.kind);
    let decided = job
        .artifacts
        .iter()
        .filter(|o| planned.contains(&o.purpose()))
        .count();
    ((decided * 100) / planned.len()) as u8
}

pub struct MediaPipeline {
    config: Arc<PipelineConfig>,
    engine: Arc<dyn MediaEngine>,
    store: Arc<dyn JobStore>,
    artifacts: Arc<ArtifactStore>,
    validator: UploadValidator,
    queue: OnceLock<JobQueue>,
}

impl MediaPipeline {
    /// Wire the pipeline together and start its worker pool. The queue
    /// holds the pipeline weakly, so dropping the returned Arc tears the
    /// pool down.
    pub fn start(
        config: Arc<PipelineConfig>,
        engine: Arc<dyn MediaEngine>,
        store: Arc<dyn JobStore>,
        artifacts: Arc<ArtifactStore>,
    ) -> Arc<Self> {
        let validator = UploadValidator::new(config.clone(), engine.clone());
        let pipeline = Arc::new(Self {
            config: config.clone(),
            engine,
            store,
            artifacts,
            validator,
            queue: OnceLock::new(),
        });

        let context: Weak<dyn JobHandlerContext> =
            Arc::downgrade(&(pipeline.clone() as Arc<dyn JobHandlerContext>));
        let queue = JobQueue::new(
            QueueConfig {
                max_workers: config.max_workers,
                max_retries: config.max_retries,
                reap_interval_secs: config.orphan_grace_secs.clamp(1, 60),
            },
            context,
        );
        // Fresh OnceLock on a pipeline we just built; the set cannot race.
        let _ = pipeline.queue.set(queue);
        pipeline
    }

    fn queue(&self) -> Result<&JobQueue> {
        self.queue
            .get()
            .ok_or_else(|| anyhow::anyhow!("Pipeline queue not started"))
    }

    /// The synchronous upload path. Stages the bytes, validates, produces
    /// the placeholder, enqueues the background phase and answers. Never
    /// transcodes.
    #[tracing::instrument(skip(self, data), fields(filename = %original_filename, kind = %kind, size = data.len()))]
    pub async fn submit(
        &self,
        data: Bytes,
        original_filename: &str,
        user_id: Uuid,
        kind: MediaKind,
    ) -> Result<SubmitResponse> {
        let filename = sanitize_filename(original_filename);
        let extension = Path::new(&filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_else(|| "bin".to_string());

        let file_size = data.len() as i64;
        let (staged_key, staged_path) = self
            .artifacts
            .stage_bytes(data, &extension)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to stage upload: {}", e))?;

        let mut job = UploadJob::new(user_id, kind, filename.clone(), staged_key.clone(), file_size);

        let media = match self.validator.validate(&staged_path, &filename, kind).await {
            Ok(media) => media,
            Err(error) => {
                tracing::info!(job_id = %job.id, code = error.code(), "Upload rejected");
                job.fail(
                    error.code(),
                    truncate_diagnostic(&error.to_string(), MAX_DIAGNOSTIC_LEN),
                );
                self.store.insert(job.clone()).await?;
                if let Err(e) = self.artifacts.remove(&staged_key).await {
                    tracing::warn!(key = %staged_key, error = %e, "Failed to drop rejected staging file");
                }
                return Ok(SubmitResponse::rejected(&job));
            }
        };
        job.duration = Some(media.duration);

        match kind {
            MediaKind::Video | MediaKind::Image => {
                self.make_placeholder_thumbnail(&mut job, &staged_path)
                    .await;
            }
            MediaKind::Audio => {
                self.make_placeholder_waveform(&mut job, &staged_path).await;
            }
        }

        job.transition(JobStatus::PlaceholderReady);
        self.store.insert(job.clone()).await?;

        // A record stuck in placeholder_ready is invisible to the orphan
        // sweep, so a lost enqueue has to settle the job here.
        let enqueued = match self.queue() {
            Ok(queue) => queue.submit(job.id).await,
            Err(error) => Err(error),
        };
        if let Err(error) = enqueued {
            tracing::error!(job_id = %job.id, error = %error, "Enqueue failed, failing job");
            job.fail(
                "processing_failed",
                truncate_diagnostic(&error.to_string(), MAX_DIAGNOSTIC_LEN),
            );
            self.store.update(job.clone()).await?;
            return Ok(SubmitResponse::rejected(&job));
        }

        Ok(SubmitResponse::accepted(
            &job,
            estimate_seconds(media.duration),
        ))
    }

    /// Poll shape for one job, or None when unknown.
    pub async fn get_status(&self, job_id: Uuid) -> Result<Option<JobStatusResponse>> {
        Ok(self
            .store
            .get(job_id)
            .await?
            .map(|job| JobStatusResponse::from_job(&job, progress_percent(&job))))
    }

    /// Durable summary of a job, URLs keyed by purpose.
    pub async fn final_record(&self, job_id: Uuid) -> Result<Option<MediaRecord>> {
        Ok(self.store.get(job_id).await?.map(|j| MediaRecord::from_job(&j)))
    }

    /// On-demand demux of a video job's audio track into a standalone
    /// audio artifact. Not part of the background sequence, and only
    /// available once the job is terminal. Fails with `no_audio_track`
    /// when the probe sees no audio stream; the staged source must still
    /// be inside its retention window.
    #[tracing::instrument(skip(self), fields(job_id = %job_id))]
    pub async fn extract_audio(&self, job_id: Uuid) -> Result<Artifact> {
        let mut job = self
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Unknown job: {}", job_id))?;
        if job.kind != MediaKind::Video {
            anyhow::bail!("Audio extraction only applies to video jobs");
        }
        // The background phase and this path both rewrite the whole job
        // record; wait until the job is settled so neither overwrites the
        // other's artifacts.
        if !job.status.is_terminal() {
            anyhow::bail!(
                "Audio extraction requires a settled job, {} is {}",
                job.id,
                job.status
            );
        }

        let input = self
            .artifacts
            .resolve(&job.staged_key)
            .map_err(|e| anyhow::anyhow!("Bad staged key: {}", e))?;
        let source = self.engine.probe(&input).await?;
        if !source.has_audio {
            return Err(PipelineError::NoAudioTrack.into());
        }

        let scratch = tempfile::tempdir().map_err(PipelineError::from)?;
        let rel = format!("{}_audio.m4a", job.id);
        let output = scratch.path().join(&rel);
        self.engine
            .extract_audio(&input, &output, self.config.max_duration_secs, &source)
            .await?;

        let published = self
            .artifacts
            .write_file(job.kind.category_dir(), &rel, &output)
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        let artifact = Artifact {
            purpose: ArtifactPurpose::AudioTrack,
            storage_key: published.key,
            public_url: published.url,
            byte_size: published.byte_size,
            content_type: "audio/mp4".to_string(),
            created_at: Utc::now(),
        };
        job.record_artifact(ArtifactOutcome::Ready(artifact.clone()));
        self.store.update(job).await?;
        Ok(artifact)
    }

    /// Stop claiming new jobs. In-flight jobs finish under their own
    /// watchdogs.
    pub async fn shutdown(&self) {
        if let Ok(queue) = self.queue() {
            queue.shutdown().await;
        }
    }

    /// Small thumbnail on the accept path; failure costs the caller a
    /// placeholder, never the upload.
    async fn make_placeholder_thumbnail(&self, job: &mut UploadJob, input: &Path) {
        match self.produce_thumbnail(job, input, &placeholder_spec()).await {
            Ok(artifact) => job.record_artifact(ArtifactOutcome::Ready(artifact)),
            Err(error) => {
                tracing::warn!(job_id = %job.id, error = %error, "Placeholder thumbnail failed");
                job.record_artifact(failed_outcome(ArtifactPurpose::ThumbnailSmall, &error));
            }
        }
    }

    /// Waveform on the accept path; an extraction failure degrades to the
    /// flat sequence so the caller can always render something.
    async fn make_placeholder_waveform(&self, job: &mut UploadJob, input: &Path) {
        let waveform = match self
            .engine
            .waveform(input, self.config.waveform_points)
            .await
        {
            Ok(waveform) => waveform,
            Err(error) => {
                tracing::warn!(job_id = %job.id, error = %error, "Waveform extraction failed, using flat fallback");
                WaveformSample::flat(self.config.waveform_points)
            }
        };

        match serde_json::to_vec(&waveform.points) {
            Ok(json) => {
                let rel = format!("{}_waveform.json", job.id);
                match self
                    .artifacts
                    .write_bytes(job.kind.category_dir(), &rel, Bytes::from(json))
                    .await
                {
                    Ok(published) => {
                        job.record_artifact(ArtifactOutcome::Ready(Artifact {
                            purpose: ArtifactPurpose::Waveform,
                            storage_key: published.key,
                            public_url: published.url,
                            byte_size: published.byte_size,
                            content_type: "application/json".to_string(),
                            created_at: Utc::now(),
                        }));
                    }
                    Err(error) => {
                        tracing::warn!(job_id = %job.id, error = %error, "Failed to publish waveform artifact");
                    }
                }
            }
            Err(error) => {
                tracing::warn!(job_id = %job.id, error = %error, "Failed to serialize waveform");
            }
        }
        job.waveform = Some(waveform);
    }

    /// Encode one profile into the artifact tree. Scratch output lands in
    /// a tempdir and is published atomically.
    async fn produce_rendition(
        &self,
        job: &UploadJob,
        input: &Path,
        profile: &TranscodeProfile,
        source: &MediaMetadata,
    ) -> Result<Artifact, PipelineError> {
        let scratch = tempfile::tempdir()?;
        let rel = format!("{}_{}.{}", job.id, profile.purpose.tag(), profile.extension);
        let output = scratch.path().join(&rel);

        self.engine
            .transcode(input, &output, profile, source)
            .await?;

        let published = self
            .artifacts
            .write_file(job.kind.category_dir(), &rel, &output)
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        Ok(Artifact {
            purpose: profile.purpose,
            storage_key: published.key,
            public_url: published.url,
            byte_size: published.byte_size,
            content_type: profile.content_type.to_string(),
            created_at: Utc::now(),
        })
    }

    async fn produce_thumbnail(
        &self,
        job: &UploadJob,
        input: &Path,
        spec: &ThumbnailSpec,
    ) -> Result<Artifact, PipelineError> {
        let scratch = tempfile::tempdir()?;
        let name = format!("{}_{}.jpg", job.id, spec.purpose.tag());
        let output = scratch.path().join(&name);

        self.engine.extract_frame(input, &output, spec).await?;

        let rel = format!("thumbnails/{}", name);
        let published = self
            .artifacts
            .write_file(job.kind.category_dir(), &rel, &output)
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        Ok(Artifact {
            purpose: spec.purpose,
            storage_key: published.key,
            public_url: published.url,
            byte_size: published.byte_size,
            content_type: "image/jpeg".to_string(),
            created_at: Utc::now(),
        })
    }

    /// Core rendition: failure here is the job's failure and bubbles up to
    /// the queue's retry policy.
    async fn core_step(
        &self,
        job: &mut UploadJob,
        input: &Path,
        profile: &TranscodeProfile,
        source: &MediaMetadata,
    ) -> Result<()> {
        match self.produce_rendition(job, input, profile, source).await {
            Ok(artifact) => {
                job.record_artifact(ArtifactOutcome::Ready(artifact));
                self.store.update(job.clone()).await?;
                Ok(())
            }
            Err(error) => {
                job.record_artifact(failed_outcome(profile.purpose, &error));
                self.store.update(job.clone()).await?;
                Err(error.into())
            }
        }
    }

    /// Cosmetic rendition: the outcome is recorded either way and the job
    /// carries on.
    async fn cosmetic_step(
        &self,
        job: &mut UploadJob,
        input: &Path,
        profile: &TranscodeProfile,
        source: &MediaMetadata,
    ) -> Result<()> {
        let outcome = match self.produce_rendition(job, input, profile, source).await {
            Ok(artifact) => ArtifactOutcome::Ready(artifact),
            Err(error) => {
                tracing::warn!(
                    job_id = %job.id,
                    purpose = %profile.purpose,
                    error = %error,
                    "Optional rendition failed"
                );
                failed_outcome(profile.purpose, &error)
            }
        };
        job.record_artifact(outcome);
        self.store.update(job.clone()).await?;
        Ok(())
    }

    async fn cosmetic_thumbnail_step(
        &self,
        job: &mut UploadJob,
        input: &Path,
        spec: &ThumbnailSpec,
    ) -> Result<()> {
        let outcome = match self.produce_thumbnail(job, input, spec).await {
            Ok(artifact) => ArtifactOutcome::Ready(artifact),
            Err(error) => {
                tracing::warn!(
                    job_id = %job.id,
                    purpose = %spec.purpose,
                    error = %error,
                    "Thumbnail failed"
                );
                failed_outcome(spec.purpose, &error)
            }
        };
        job.record_artifact(outcome);
        self.store.update(job.clone()).await?;
        Ok(())
    }
}

fn failed_outcome(purpose: ArtifactPurpose, error: &PipelineError) -> ArtifactOutcome {
    ArtifactOutcome::Failed {
        purpose,
        code: error.code().to_string(),
        detail: truncate_diagnostic(&error.to_string(), MAX_DIAGNOSTIC_LEN),
    }
}

#[async_trait]
impl JobHandlerContext for MediaPipeline {
    #[tracing::instrument(skip(self), fields(job_id = %job_id))]
    async fn run_job(&self, job_id: Uuid) -> Result<()> {
        let mut job = self
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Unknown job: {}", job_id))?;

        if job.status.is_terminal() {
            tracing::warn!(status = %job.status, "Skipping terminal job");
            return Ok(());
        }
        if !job.transition(JobStatus::Processing) {
            anyhow::bail!("Job {} not ready for processing ({})", job_id, job.status);
        }
        job.attempts += 1;
        self.store.update(job.clone()).await?;

        let input = self
            .artifacts
            .resolve(&job.staged_key)
            .map_err(|e| anyhow::anyhow!("Bad staged key: {}", e))?;
        // Re-probe rather than trusting state recorded before a possible
        // crash; the file on disk is the truth.
        let source = self.engine.probe(&input).await?;
        let max_duration = self.config.max_duration_secs;

        match job.kind {
            MediaKind::Video => {
                let core = TranscodeProfile::optimized_video(max_duration);
                self.core_step(&mut job, &input, &core, &source).await?;
                for spec in background_specs() {
                    self.cosmetic_thumbnail_step(&mut job, &input, spec).await?;
                }
                for profile in TranscodeProfile::ladder(max_duration) {
                    self.cosmetic_step(&mut job, &input, &profile, &source)
                        .await?;
                }
            }
            MediaKind::Audio => {
                let core = TranscodeProfile::optimized_audio(max_duration);
                self.core_step(&mut job, &input, &core, &source).await?;
            }
            MediaKind::Image => {
                let core = TranscodeProfile::optimized_image();
                self.core_step(&mut job, &input, &core, &source).await?;
                for spec in background_specs() {
                    self.cosmetic_thumbnail_step(&mut job, &input, spec).await?;
                }
            }
        }

        job.transition(JobStatus::Completed);
        self.store.update(job.clone()).await?;
        tracing::info!(artifacts = job.artifacts.len(), "Job completed");
        Ok(())
    }

    async fn job_failed(&self, job_id: Uuid, error: &anyhow::Error) {
        let job = match self.store.get(job_id).await {
            Ok(Some(job)) => Some(job),
            Ok(None) => {
                tracing::error!(job_id = %job_id, "Failed job not found in store");
                None
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Could not load failed job");
                None
            }
        };
        let Some(mut job) = job else { return };
        if job.status.is_terminal() {
            return;
        }

        let code = error
            .downcast_ref::<PipelineError>()
            .map(|e| e.code())
            .unwrap_or("processing_failed");
        job.fail(code, truncate_diagnostic(&error.to_string(), MAX_DIAGNOSTIC_LEN));
        if let Err(e) = self.store.update(job).await {
            tracing::error!(job_id = %job_id, error = %e, "Could not persist job failure");
        }
        tracing::error!(job_id = %job_id, code, "Job failed terminally");
    }

    /// Sweep jobs stuck in processing past the grace window: re-drive the
    /// ones with attempts left, fail the rest as orphaned.
    async fn recover_orphans(&self) -> Result<usize> {
        let grace = chrono::Duration::from_std(self.config.orphan_grace())?;
        let cutoff = Utc::now() - grace;
        let mut touched = 0usize;

        for mut job in self.store.list_by_status(JobStatus::Processing).await? {
            if job.updated_at > cutoff {
                continue;
            }
            if job.attempts > self.config.max_retries {
                tracing::warn!(job_id = %job.id, attempts = job.attempts, "Orphaned job, giving up");
                job.fail(
                    PipelineError::OrphanedJob.code(),
                    format!("no progress after {} attempts", job.attempts),
                );
                self.store.update(job).await?;
            } else {
                tracing::warn!(job_id = %job.id, attempts = job.attempts, "Orphaned job, re-driving");
                // Bumps updated_at so the next sweep does not double-submit.
                job.transition(JobStatus::Processing);
                let id = job.id;
                self.store.update(job).await?;
                self.queue()?.submit(id).await?;
            }
            touched += 1;
        }
        Ok(touched)
    }
}
