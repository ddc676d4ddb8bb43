//! Test harness: a fully in-process pipeline over a fake media engine, so
//! no external tool needs to be installed.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use clipflow_core::models::{JobStatus, MediaMetadata, WaveformSample};
use clipflow_core::{PipelineConfig, PipelineError};
use clipflow_pipeline::{JobStatusResponse, MediaPipeline, MemoryJobStore};
use clipflow_processing::transcoder::effective_duration;
use clipflow_processing::{compute_waveform, MediaEngine, ThumbnailSpec, TranscodeProfile};
use clipflow_storage::ArtifactStore;

/// Scripted engine. Operations fail when their key is in `fail`:
/// `probe`, `waveform`, or an artifact purpose string such as
/// `optimized`, `rendition:high`, `thumbnail:small`, `audio`.
pub struct FakeEngine {
    pub metadata: Mutex<MediaMetadata>,
    pub fail: Mutex<HashSet<String>>,
    /// (purpose, output duration) per finished encode.
    pub encoded: Mutex<Vec<(String, f64)>>,
    /// PCM the waveform op pretends to decode.
    pub pcm: Mutex<Vec<i16>>,
    /// Artificial per-encode latency.
    pub encode_delay: Mutex<Option<Duration>>,
}

impl FakeEngine {
    pub fn video(duration: f64, has_audio: bool) -> Arc<Self> {
        Arc::new(Self {
            metadata: Mutex::new(MediaMetadata {
                duration,
                container: "mp4".into(),
                codec: Some("h264".into()),
                width: Some(1920),
                height: Some(1080),
                sample_rate: if has_audio { Some(48_000) } else { None },
                channels: if has_audio { Some(2) } else { None },
                has_audio,
                bitrate: Some(2_000_000),
            }),
            fail: Mutex::new(HashSet::new()),
            encoded: Mutex::new(Vec::new()),
            pcm: Mutex::new(Vec::new()),
            encode_delay: Mutex::new(None),
        })
    }

    pub fn audio(duration: f64, pcm: Vec<i16>) -> Arc<Self> {
        let engine = Self::video(duration, true);
        {
            let mut metadata = engine.metadata.lock().unwrap();
            metadata.container = "mp3".into();
            metadata.codec = Some("mp3".into());
            metadata.width = None;
            metadata.height = None;
        }
        *engine.pcm.lock().unwrap() = pcm;
        engine
    }

    pub fn fail_on(&self, key: &str) {
        self.fail.lock().unwrap().insert(key.to_string());
    }

    fn should_fail(&self, key: &str) -> bool {
        self.fail.lock().unwrap().contains(key)
    }

    pub fn encode_count(&self) -> usize {
        self.encoded.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn probe(&self, _path: &Path) -> Result<MediaMetadata, PipelineError> {
        if self.should_fail("probe") {
            return Err(PipelineError::CorruptOrUnreadable(
                "moov atom not found".to_string(),
            ));
        }
        Ok(self.metadata.lock().unwrap().clone())
    }

    async fn extract_frame(
        &self,
        _input: &Path,
        output: &Path,
        spec: &ThumbnailSpec,
    ) -> Result<(), PipelineError> {
        let key = spec.purpose.to_string();
        if self.should_fail(&key) {
            return Err(PipelineError::Thumbnail {
                size: key,
                detail: "fake extractor exit 1".to_string(),
            });
        }
        std::fs::write(output, b"jpeg-bytes")?;
        Ok(())
    }

    async fn waveform(
        &self,
        _input: &Path,
        points: usize,
    ) -> Result<WaveformSample, PipelineError> {
        if self.should_fail("waveform") {
            return Err(PipelineError::Thumbnail {
                size: "waveform".to_string(),
                detail: "fake decoder exit 1".to_string(),
            });
        }
        let pcm = self.pcm.lock().unwrap().clone();
        Ok(compute_waveform(&pcm, points))
    }

    async fn transcode(
        &self,
        _input: &Path,
        output: &Path,
        profile: &TranscodeProfile,
        source: &MediaMetadata,
    ) -> Result<(), PipelineError> {
        let delay = *self.encode_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let key = profile.purpose.to_string();
        if self.should_fail(&key) {
            return Err(PipelineError::Transcode("fake encoder exit 1".to_string()));
        }
        self.encoded.lock().unwrap().push((
            key,
            effective_duration(source.duration, profile.max_duration_secs),
        ));
        std::fs::write(output, b"encoded-bytes")?;
        Ok(())
    }

    async fn extract_audio(
        &self,
        _input: &Path,
        output: &Path,
        max_duration_secs: f64,
        source: &MediaMetadata,
    ) -> Result<(), PipelineError> {
        if !source.has_audio {
            return Err(PipelineError::NoAudioTrack);
        }
        if self.should_fail("audio") {
            return Err(PipelineError::Extraction(
                "fake demuxer produced empty output".to_string(),
            ));
        }
        self.encoded.lock().unwrap().push((
            "audio".to_string(),
            effective_duration(source.duration, max_duration_secs),
        ));
        std::fs::write(output, b"audio-bytes")?;
        Ok(())
    }
}

pub struct TestHarness {
    pub pipeline: Arc<MediaPipeline>,
    pub engine: Arc<FakeEngine>,
    pub store: Arc<MemoryJobStore>,
    pub artifacts: Arc<ArtifactStore>,
    // Held for its Drop, which removes the artifact tree.
    pub root: tempfile::TempDir,
}

/// Wire a pipeline over the fake engine with a scratch artifact root and
/// no retries, so failure tests stay fast.
pub async fn build_pipeline(engine: Arc<FakeEngine>) -> TestHarness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let root = tempfile::tempdir().unwrap();
    let mut config = PipelineConfig::default();
    config.artifact_root = root.path().to_path_buf();
    config.max_retries = 0;

    let store = Arc::new(MemoryJobStore::new());
    let artifacts = Arc::new(
        ArtifactStore::new(root.path(), "http://localhost:3000/media".to_string())
            .await
            .unwrap(),
    );
    let pipeline = MediaPipeline::start(
        Arc::new(config),
        engine.clone(),
        store.clone(),
        artifacts.clone(),
    );

    TestHarness {
        pipeline,
        engine,
        store,
        artifacts,
        root,
    }
}

pub fn upload_bytes(len: usize) -> Bytes {
    Bytes::from(vec![0x42u8; len])
}

/// Poll until the job reaches a terminal state.
pub async fn wait_until_terminal(harness: &TestHarness, job_id: Uuid) -> JobStatusResponse {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(status) = harness.pipeline.get_status(job_id).await.unwrap() {
                if matches!(status.status, JobStatus::Completed | JobStatus::Failed) {
                    return status;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job never reached a terminal state")
}
