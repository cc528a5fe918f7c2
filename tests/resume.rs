// tests/resume.rs
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use seeding_collector::config::CollectorConfig;
use seeding_collector::model::{ExternalProfile, RawComment, RawCommentUser, RawVideoInfo};
use seeding_collector::pipeline::{Pipeline, SkipReason, StopReason, VideoOutcome};
use seeding_collector::progress::ProgressTracker;
use seeding_collector::source::memory::MemorySource;

fn test_config(dir: &Path) -> CollectorConfig {
    CollectorConfig {
        output_dir: dir.join("out"),
        time_range_days: 0,
        profile_delay_ms: 0,
        video_delay_min_ms: 0,
        video_delay_max_ms: 0,
        ..Default::default()
    }
}

fn url(id: &str) -> String {
    format!("https://www.tiktok.com/@shop/video/{id}")
}

fn comment(cid: &str, user: &str, text: &str) -> RawComment {
    RawComment {
        cid: Some(cid.into()),
        text: text.into(),
        create_time: Some(1_700_000_000),
        user: RawCommentUser {
            unique_id: user.into(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Three videos with three comments each; every author has a profile.
fn source() -> MemorySource {
    let mut src = MemorySource::new();
    for v in ["v1", "v2", "v3"] {
        let info = RawVideoInfo {
            id: Some(v.into()),
            create_time: Some(Utc::now().timestamp()),
            ..Default::default()
        };
        let comments = (0..3)
            .map(|i| comment(&format!("{v}-c{i}"), &format!("{v}-u{i}"), "hay quá"))
            .collect();
        src = src.with_video(&url(v), info).with_comments(v, comments);
        for i in 0..3 {
            src = src.with_profile(&format!("{v}-u{i}"), ExternalProfile::default());
        }
    }
    src
}

#[tokio::test]
async fn interrupted_video_is_redone_without_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let urls = [url("v1"), url("v2")];

    // first run hangs while enriching v2's authors and is cancelled
    {
        let src = Arc::new(source().stalled_profile("v2-u1"));
        let mut pipeline = Pipeline::new(test_config(dir.path()), src.clone(), src).unwrap();
        let res = tokio::time::timeout(Duration::from_millis(500), pipeline.run(&urls)).await;
        assert!(res.is_err(), "run should have been cut short");

        let store = pipeline.store();
        let comments = store.read_comments().unwrap();
        assert_eq!(comments.len(), 3);
        assert!(comments.iter().all(|c| c.video_id == "v1"));
        assert!(store.read_users().unwrap().iter().all(|u| u.user_unique_id.starts_with("v1")));
        assert!(store.read_seeding().unwrap().iter().all(|s| s.video_id == "v1"));
        assert!(!store.persisted_video_ids().unwrap().contains("v2"));
    }

    let progress = ProgressTracker::load(&test_config(dir.path()).progress_path());
    assert_eq!(progress.state().processed_videos, vec!["v1"]);

    // restart: v1 is skipped, v2 is collected from scratch
    let src = Arc::new(source());
    let mut pipeline = Pipeline::new(test_config(dir.path()), src.clone(), src.clone()).unwrap();
    let summary = pipeline.run(&urls).await;
    assert_eq!(summary.flushed, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(src.stream_calls(), vec!["v2".to_string()]);

    let comments = pipeline.store().read_comments().unwrap();
    assert_eq!(comments.len(), 6);
    let mut ids: Vec<_> = comments.iter().map(|c| c.comment_id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 6);
    assert_eq!(pipeline.tracker().total_comments(), 6);
    assert_eq!(pipeline.tracker().state().total_users, 6);
}

#[tokio::test]
async fn video_in_outputs_but_not_in_progress_is_reconciled() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    {
        let src = Arc::new(source());
        let mut pipeline = Pipeline::new(cfg.clone(), src.clone(), src).unwrap();
        pipeline.run(&[url("v1")]).await;
    }
    // crash between the flush and the progress write
    fs::remove_file(cfg.progress_path()).unwrap();

    let src = Arc::new(source());
    let mut pipeline = Pipeline::new(cfg.clone(), src.clone(), src.clone()).unwrap();
    let out = pipeline.process_video(&url("v1")).await.unwrap();
    assert_eq!(out, VideoOutcome::Skipped(SkipReason::RecoveredFromOutput));
    assert!(src.stream_calls().is_empty());
    assert_eq!(pipeline.store().read_comments().unwrap().len(), 3);

    let reloaded = ProgressTracker::load(&cfg.progress_path());
    assert_eq!(reloaded.state().processed_videos, vec!["v1"]);
    assert_eq!(reloaded.total_comments(), 3);
    assert_eq!(reloaded.state().total_users, 3);

    // a second pass sees it as plainly processed
    let out = pipeline.process_video(&url("v1")).await.unwrap();
    assert_eq!(out, VideoOutcome::Skipped(SkipReason::AlreadyProcessed));
}

#[tokio::test]
async fn stops_when_comment_target_is_reached() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = CollectorConfig {
        target_comment_count: 3,
        ..test_config(dir.path())
    };
    let src = Arc::new(source());
    let mut pipeline = Pipeline::new(cfg, src.clone(), src.clone()).unwrap();
    let summary = pipeline.run(&[url("v1"), url("v2"), url("v3")]).await;

    assert_eq!(summary.stop, StopReason::TargetReached);
    assert_eq!(summary.flushed, 1);
    assert_eq!(src.stream_calls(), vec!["v1".to_string()]);
}

#[tokio::test]
async fn stops_at_max_videos_counting_earlier_runs() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = CollectorConfig {
        max_videos: 2,
        ..test_config(dir.path())
    };
    {
        let src = Arc::new(source());
        let mut pipeline = Pipeline::new(cfg.clone(), src.clone(), src).unwrap();
        let summary = pipeline.run(&[url("v1")]).await;
        assert_eq!(summary.stop, StopReason::Exhausted);
    }

    let src = Arc::new(source());
    let mut pipeline = Pipeline::new(cfg, src.clone(), src.clone()).unwrap();
    let summary = pipeline.run(&[url("v2"), url("v3")]).await;
    assert_eq!(summary.stop, StopReason::MaxVideos);
    assert_eq!(summary.processed_videos, 2);
    assert_eq!(src.stream_calls(), vec!["v2".to_string()]);
}

#[tokio::test]
async fn already_reached_target_processes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    fs::create_dir_all(&cfg.output_dir).unwrap();
    fs::write(
        cfg.progress_path(),
        r#"{"processed_videos": [], "total_comments": 10000, "total_users": 0}"#,
    )
    .unwrap();

    let src = Arc::new(source());
    let mut pipeline = Pipeline::new(cfg, src.clone(), src.clone()).unwrap();
    let summary = pipeline.run(&[url("v1")]).await;
    assert_eq!(summary.stop, StopReason::TargetReached);
    assert!(src.stream_calls().is_empty());
}

#[tokio::test]
async fn failed_video_does_not_leak_into_later_user_stats() {
    let dir = tempfile::tempdir().unwrap();
    let info = |id: &str| RawVideoInfo {
        id: Some(id.into()),
        create_time: Some(Utc::now().timestamp()),
        ..Default::default()
    };
    // v1's stream drops after three comments by `a`
    let src = Arc::new(
        MemorySource::new()
            .with_video(&url("v1"), info("v1"))
            .with_video(&url("v2"), info("v2"))
            .with_comments(
                "v1",
                vec![
                    comment("x1", "a", "hay quá"),
                    comment("x2", "a", "hay quá"),
                    comment("x3", "a", "hay quá"),
                ],
            )
            .broken_stream("v1")
            .with_comments("v2", vec![comment("y1", "a", "hay quá")])
            .with_profile("a", ExternalProfile::default()),
    );
    let mut pipeline = Pipeline::new(test_config(dir.path()), src.clone(), src).unwrap();
    let summary = pipeline.run(&[url("v1"), url("v2")]).await;
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.flushed, 1);

    let store = pipeline.store();
    assert_eq!(store.read_comments().unwrap().len(), 1);
    let users = store.read_users().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].comment_count, 1);
    assert_eq!(users[0].unique_video_count, 1);
    assert_eq!(users[0].duplicate_ratio, 0.0);
    let seeding = store.read_seeding().unwrap();
    assert_eq!(seeding[0].user_comment_count_in_dataset, 1);
}

#[tokio::test]
async fn failed_flush_is_redone_without_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let users_path = cfg.output_dir.join("tiktok_users.csv");
    {
        let src = Arc::new(source());
        let mut pipeline = Pipeline::new(cfg.clone(), src.clone(), src).unwrap();
        // users file turns unwritable after the outputs were opened
        fs::remove_file(&users_path).unwrap();
        fs::create_dir(&users_path).unwrap();

        let summary = pipeline.run(&[url("v1")]).await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.flushed, 0);
        let store = pipeline.store();
        assert!(store.read_comments().unwrap().is_empty());
        assert!(store.read_seeding().unwrap().is_empty());
        assert!(store.persisted_video_ids().unwrap().is_empty());
    }
    fs::remove_dir(&users_path).unwrap();

    let src = Arc::new(source());
    let mut pipeline = Pipeline::new(cfg, src.clone(), src).unwrap();
    let summary = pipeline.run(&[url("v1")]).await;
    assert_eq!(summary.flushed, 1);

    let store = pipeline.store();
    let ids: Vec<_> = store
        .read_comments()
        .unwrap()
        .into_iter()
        .map(|c| c.comment_id)
        .collect();
    assert_eq!(ids, vec!["v1-c0", "v1-c1", "v1-c2"]);
    assert_eq!(store.read_seeding().unwrap().len(), 3);
    assert_eq!(store.read_users().unwrap().len(), 3);
    assert_eq!(pipeline.tracker().total_comments(), 3);
}
