mod helpers;

use chrono::Utc;
use uuid::Uuid;

use clipflow_core::models::{JobStatus, MediaKind, UploadJob};
use clipflow_core::PipelineError;
use clipflow_pipeline::JobStore;
use clipflow_worker::JobHandlerContext;

use helpers::{build_pipeline, upload_bytes, wait_until_terminal, FakeEngine};

#[tokio::test]
async fn video_happy_path_produces_full_artifact_set() {
    let harness = build_pipeline(FakeEngine::video(90.0, true)).await;

    let response = harness
        .pipeline
        .submit(
            upload_bytes(1024 * 1024),
            "clip.mp4",
            Uuid::new_v4(),
            MediaKind::Video,
        )
        .await
        .unwrap();

    assert_eq!(response.status, JobStatus::PlaceholderReady);
    assert!(response.error.is_none());
    assert_eq!(response.duration, Some(90.0));
    // 4 + 90/2, rounded up.
    assert_eq!(response.estimated_seconds, Some(49));
    let placeholder = response.placeholder_thumbnail_url.unwrap();
    assert!(placeholder.contains("/videos/thumbnails/"));
    assert!(placeholder.ends_with("_small.jpg"));

    let status = wait_until_terminal(&harness, response.job_id).await;
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.progress_percent, 100);
    assert_eq!(status.artifacts.len(), 7);
    assert!(status.artifacts.iter().all(|a| a.status == "ready"));

    // The optimized rendition is on disk at its published path.
    let optimized = harness
        .root
        .path()
        .join("videos")
        .join(format!("{}_optimized.mp4", response.job_id));
    assert!(optimized.exists());

    let record = harness
        .pipeline
        .final_record(response.job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.category, "videos");
    assert_eq!(record.urls.len(), 7);
    for key in ["optimized", "rendition:low", "rendition:high", "thumbnail:large"] {
        assert!(record.urls.contains_key(key), "missing {}", key);
    }
}

#[tokio::test]
async fn over_length_source_is_trimmed_never_rejected() {
    // 90 s source against a 60 s ceiling: accepted, every encode trimmed.
    let harness = build_pipeline(FakeEngine::video(90.0, true)).await;

    let response = harness
        .pipeline
        .submit(
            upload_bytes(2048),
            "long.mp4",
            Uuid::new_v4(),
            MediaKind::Video,
        )
        .await
        .unwrap();
    assert!(response.error.is_none());

    let status = wait_until_terminal(&harness, response.job_id).await;
    assert_eq!(status.status, JobStatus::Completed);

    let encoded = harness.engine.encoded.lock().unwrap().clone();
    assert!(!encoded.is_empty());
    for (purpose, duration) in encoded {
        assert_eq!(duration, 60.0, "{} not trimmed to the ceiling", purpose);
    }
}

#[tokio::test]
async fn failed_quality_rung_does_not_abort_the_rest() {
    let harness = build_pipeline(FakeEngine::video(30.0, true)).await;
    harness.engine.fail_on("rendition:high");

    let response = harness
        .pipeline
        .submit(
            upload_bytes(2048),
            "clip.mp4",
            Uuid::new_v4(),
            MediaKind::Video,
        )
        .await
        .unwrap();

    let status = wait_until_terminal(&harness, response.job_id).await;
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.progress_percent, 100);

    let failed: Vec<_> = status
        .artifacts
        .iter()
        .filter(|a| a.status == "failed")
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].purpose, "rendition:high");
    assert_eq!(failed[0].error.as_deref(), Some("transcode_failed"));
    // The other rungs and thumbnails all made it.
    assert_eq!(
        status.artifacts.iter().filter(|a| a.status == "ready").count(),
        6
    );
}

#[tokio::test]
async fn failed_core_rendition_fails_the_job() {
    let harness = build_pipeline(FakeEngine::video(30.0, true)).await;
    harness.engine.fail_on("optimized");

    let response = harness
        .pipeline
        .submit(
            upload_bytes(2048),
            "clip.mp4",
            Uuid::new_v4(),
            MediaKind::Video,
        )
        .await
        .unwrap();
    // The accept path itself still succeeds.
    assert_eq!(response.status, JobStatus::PlaceholderReady);

    let status = wait_until_terminal(&harness, response.job_id).await;
    assert_eq!(status.status, JobStatus::Failed);
    assert_eq!(status.progress_percent, 100);
    assert_eq!(status.error.unwrap().code, "transcode_failed");
}

#[tokio::test]
async fn silent_audio_yields_flat_waveform() {
    // Five seconds of digital silence.
    let harness = build_pipeline(FakeEngine::audio(5.0, vec![0i16; 40_000])).await;

    let response = harness
        .pipeline
        .submit(
            upload_bytes(8 * 1024 * 1024),
            "quiet.mp3",
            Uuid::new_v4(),
            MediaKind::Audio,
        )
        .await
        .unwrap();

    let waveform = response.waveform.unwrap();
    assert_eq!(waveform.len(), 20);
    assert!(waveform.iter().all(|v| (*v - 0.5).abs() < f32::EPSILON));

    let status = wait_until_terminal(&harness, response.job_id).await;
    assert_eq!(status.status, JobStatus::Completed);

    // The waveform is also published as a JSON artifact.
    let json_path = harness
        .root
        .path()
        .join("audio")
        .join(format!("{}_waveform.json", response.job_id));
    let points: Vec<f32> =
        serde_json::from_slice(&std::fs::read(json_path).unwrap()).unwrap();
    assert_eq!(points.len(), 20);
}

#[tokio::test]
async fn oversized_upload_rejected_synchronously() {
    let harness = build_pipeline(FakeEngine::audio(5.0, Vec::new())).await;

    let response = harness
        .pipeline
        .submit(
            upload_bytes(11 * 1024 * 1024),
            "big.mp3",
            Uuid::new_v4(),
            MediaKind::Audio,
        )
        .await
        .unwrap();

    assert_eq!(response.status, JobStatus::Failed);
    assert_eq!(response.error.unwrap().code, "too_large");
    assert!(response.placeholder_thumbnail_url.is_none());
    assert_eq!(harness.engine.encode_count(), 0);

    // The rejected bytes were dropped from staging.
    let staging: Vec<_> = std::fs::read_dir(harness.root.path().join("staging"))
        .unwrap()
        .collect();
    assert!(staging.is_empty());

    // The job record survives for status polling.
    let status = harness
        .pipeline
        .get_status(response.job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert_eq!(status.progress_percent, 100);
}

#[tokio::test]
async fn unknown_extension_rejected() {
    let harness = build_pipeline(FakeEngine::video(10.0, true)).await;
    let response = harness
        .pipeline
        .submit(
            upload_bytes(100),
            "notes.txt",
            Uuid::new_v4(),
            MediaKind::Video,
        )
        .await
        .unwrap();
    assert_eq!(response.status, JobStatus::Failed);
    assert_eq!(response.error.unwrap().code, "unsupported_format");
}

#[tokio::test]
async fn undecodable_upload_rejected() {
    let harness = build_pipeline(FakeEngine::video(10.0, true)).await;
    harness.engine.fail_on("probe");

    let response = harness
        .pipeline
        .submit(
            upload_bytes(100),
            "fake.mp4",
            Uuid::new_v4(),
            MediaKind::Video,
        )
        .await
        .unwrap();
    assert_eq!(response.status, JobStatus::Failed);
    let error = response.error.unwrap();
    assert_eq!(error.code, "corrupt_or_unreadable");
    assert!(error.message.contains("moov atom"));
}

#[tokio::test]
async fn placeholder_thumbnail_failure_does_not_block_the_upload() {
    let harness = build_pipeline(FakeEngine::video(10.0, true)).await;
    harness.engine.fail_on("thumbnail:small");

    let response = harness
        .pipeline
        .submit(
            upload_bytes(2048),
            "clip.mp4",
            Uuid::new_v4(),
            MediaKind::Video,
        )
        .await
        .unwrap();

    assert_eq!(response.status, JobStatus::PlaceholderReady);
    assert!(response.placeholder_thumbnail_url.is_none());
    assert!(response.error.is_none());

    let status = wait_until_terminal(&harness, response.job_id).await;
    assert_eq!(status.status, JobStatus::Completed);
    let small = status
        .artifacts
        .iter()
        .find(|a| a.purpose == "thumbnail:small")
        .unwrap();
    assert_eq!(small.status, "failed");
}

#[tokio::test]
async fn submit_answers_before_any_transcode_runs() {
    let harness = build_pipeline(FakeEngine::video(30.0, true)).await;
    *harness.engine.encode_delay.lock().unwrap() = Some(std::time::Duration::from_millis(200));

    let response = harness
        .pipeline
        .submit(
            upload_bytes(2048),
            "clip.mp4",
            Uuid::new_v4(),
            MediaKind::Video,
        )
        .await
        .unwrap();

    // The accept path never invoked the encoder.
    assert_eq!(harness.engine.encode_count(), 0);
    assert_eq!(response.status, JobStatus::PlaceholderReady);

    let status = wait_until_terminal(&harness, response.job_id).await;
    assert_eq!(status.status, JobStatus::Completed);
    assert!(harness.engine.encode_count() > 0);
}

#[tokio::test]
async fn audio_extraction_on_demand() {
    let harness = build_pipeline(FakeEngine::video(30.0, true)).await;
    let response = harness
        .pipeline
        .submit(
            upload_bytes(2048),
            "clip.mp4",
            Uuid::new_v4(),
            MediaKind::Video,
        )
        .await
        .unwrap();
    wait_until_terminal(&harness, response.job_id).await;

    let artifact = harness.pipeline.extract_audio(response.job_id).await.unwrap();
    assert!(artifact.public_url.ends_with("_audio.m4a"));
    assert!(harness
        .root
        .path()
        .join("videos")
        .join(format!("{}_audio.m4a", response.job_id))
        .exists());

    let record = harness
        .pipeline
        .final_record(response.job_id)
        .await
        .unwrap()
        .unwrap();
    assert!(record.urls.contains_key("audio"));
}

#[tokio::test]
async fn audio_extraction_without_track_short_circuits() {
    let harness = build_pipeline(FakeEngine::video(30.0, false)).await;
    let response = harness
        .pipeline
        .submit(
            upload_bytes(2048),
            "silent.mp4",
            Uuid::new_v4(),
            MediaKind::Video,
        )
        .await
        .unwrap();
    wait_until_terminal(&harness, response.job_id).await;

    let err = harness
        .pipeline
        .extract_audio(response.job_id)
        .await
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<PipelineError>().unwrap().code(),
        "no_audio_track"
    );
    // Nothing was written for the failed extraction.
    assert!(!harness
        .root
        .path()
        .join("videos")
        .join(format!("{}_audio.m4a", response.job_id))
        .exists());
}

#[tokio::test]
async fn audio_extraction_waits_for_a_settled_job() {
    let harness = build_pipeline(FakeEngine::video(30.0, true)).await;

    // A job still owned by the background phase.
    let mut job = UploadJob::new(
        Uuid::new_v4(),
        MediaKind::Video,
        "clip.mp4".into(),
        "staging/inflight.mp4".into(),
        2048,
    );
    job.transition(JobStatus::PlaceholderReady);
    job.transition(JobStatus::Processing);
    let job_id = job.id;
    harness.store.insert(job).await.unwrap();

    assert!(harness.pipeline.extract_audio(job_id).await.is_err());
    assert_eq!(harness.engine.encode_count(), 0);
    assert!(!harness
        .root
        .path()
        .join("videos")
        .join(format!("{}_audio.m4a", job_id))
        .exists());
}

#[tokio::test]
async fn enqueue_failure_after_shutdown_fails_the_job() {
    let harness = build_pipeline(FakeEngine::video(10.0, true)).await;
    harness.pipeline.shutdown().await;

    // The queue closes once the worker pool observes the signal; keep
    // submitting until the lost enqueue surfaces as a failed record.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let response = harness
            .pipeline
            .submit(
                upload_bytes(2048),
                "clip.mp4",
                Uuid::new_v4(),
                MediaKind::Video,
            )
            .await
            .unwrap();
        if response.status == JobStatus::Failed {
            assert_eq!(response.error.unwrap().code, "processing_failed");
            let status = harness
                .pipeline
                .get_status(response.job_id)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(status.status, JobStatus::Failed);
            return;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "queue never closed after shutdown"
        );
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn orphan_past_its_attempts_is_failed_by_the_sweep() {
    let harness = build_pipeline(FakeEngine::video(10.0, true)).await;

    // A job that looks crash-stranded: processing, stale, attempts spent.
    let mut job = UploadJob::new(
        Uuid::new_v4(),
        MediaKind::Video,
        "clip.mp4".into(),
        "staging/gone.mp4".into(),
        2048,
    );
    job.transition(JobStatus::PlaceholderReady);
    job.transition(JobStatus::Processing);
    job.attempts = 1;
    job.updated_at = Utc::now() - chrono::Duration::hours(2);
    let job_id = job.id;
    harness.store.insert(job).await.unwrap();

    let touched = harness.pipeline.recover_orphans().await.unwrap();
    assert_eq!(touched, 1);

    let status = harness.pipeline.get_status(job_id).await.unwrap().unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert_eq!(status.error.unwrap().code, "orphaned_job");
}

#[tokio::test]
async fn orphan_with_attempts_left_is_redriven_to_completion() {
    let harness = build_pipeline(FakeEngine::video(10.0, true)).await;

    // Stage a real input so the re-driven run can process it.
    let (staged_key, _path) = harness
        .artifacts
        .stage_bytes(upload_bytes(2048), "mp4")
        .await
        .unwrap();
    let mut job = UploadJob::new(
        Uuid::new_v4(),
        MediaKind::Video,
        "clip.mp4".into(),
        staged_key,
        2048,
    );
    job.transition(JobStatus::PlaceholderReady);
    job.transition(JobStatus::Processing);
    job.updated_at = Utc::now() - chrono::Duration::hours(2);
    let job_id = job.id;
    harness.store.insert(job).await.unwrap();

    let touched = harness.pipeline.recover_orphans().await.unwrap();
    assert_eq!(touched, 1);

    let status = wait_until_terminal(&harness, job_id).await;
    assert_eq!(status.status, JobStatus::Completed);
}

#[tokio::test]
async fn unknown_job_polls_as_none() {
    let harness = build_pipeline(FakeEngine::video(10.0, true)).await;
    assert!(harness
        .pipeline
        .get_status(Uuid::new_v4())
        .await
        .unwrap()
        .is_none());
    assert!(harness
        .pipeline
        .final_record(Uuid::new_v4())
        .await
        .unwrap()
        .is_none());
}
