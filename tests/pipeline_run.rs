// tests/pipeline_run.rs
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use seeding_collector::config::CollectorConfig;
use seeding_collector::model::{ExternalProfile, RawComment, RawCommentUser, RawVideoInfo};
use seeding_collector::pipeline::{Pipeline, SkipReason, StopReason, VideoOutcome};
use seeding_collector::scoring::explain;
use seeding_collector::source::memory::MemorySource;

const BASE_TS: i64 = 1_700_000_000;

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

fn video(id: &str) -> RawVideoInfo {
    RawVideoInfo {
        id: Some(id.into()),
        desc: format!("video {id}"),
        create_time: Some(Utc::now().timestamp()),
        ..Default::default()
    }
}

fn comment(cid: &str, user: &str, text: &str, offset: i64) -> RawComment {
    RawComment {
        cid: Some(cid.into()),
        text: text.into(),
        create_time: Some(BASE_TS + offset),
        user: RawCommentUser {
            uid: Some(format!("uid-{user}")),
            unique_id: user.into(),
            nickname: format!("nick-{user}"),
            sec_uid: String::new(),
        },
        ..Default::default()
    }
}

fn profile(followers: u64) -> ExternalProfile {
    ExternalProfile {
        followers_count: followers,
        ..Default::default()
    }
}

fn url(id: &str) -> String {
    format!("https://www.tiktok.com/@shop/video/{id}")
}

/// v1: two kept top-level comments by `a`, one rejected, one with inlined
/// replies and one whose replies were not inlined. v2: one more by `a`.
fn two_video_source() -> MemorySource {
    let mut with_reply = comment("c3", "a", "hay quá", 60);
    with_reply.reply_comment_total = 1;
    with_reply.reply_comment = Some(vec![comment("r1", "c", "đúng rồi bạn", 90)]);
    let mut without_inline = comment("c4", "c", "tuyệt vời", 120);
    without_inline.reply_comment_total = 2;

    MemorySource::new()
        .with_video(&url("v1"), video("v1"))
        .with_video(&url("v2"), video("v2"))
        .with_comments(
            "v1",
            vec![
                comment("c1", "a", "hay quá", 0),
                comment("c2", "b", "nice video", 30),
                with_reply,
                without_inline,
            ],
        )
        .with_comments("v2", vec![comment("d1", "a", "quá đỉnh luôn", 1_000)])
        .with_profile("a", profile(50))
        .with_profile("c", profile(2_000))
}

#[tokio::test]
async fn full_run_writes_all_four_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let src = Arc::new(two_video_source());
    let mut pipeline = Pipeline::new(test_config(dir.path()), src.clone(), src.clone()).unwrap();

    let summary = pipeline.run(&[url("v1"), url("v2")]).await;
    assert_eq!(summary.flushed, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.stop, StopReason::Exhausted);
    assert_eq!(summary.total_comments, 5);
    assert_eq!(summary.total_users, 3);

    let store = pipeline.store();
    let comments = store.read_comments().unwrap();
    let ids: Vec<_> = comments.iter().map(|c| c.comment_id.as_str()).collect();
    // top-level comments first, then the replies of that video
    assert_eq!(ids, vec!["c1", "c3", "c4", "r1", "d1"]);
    assert!(comments.iter().all(|c| c.comment_text != "nice video"));

    let reply = &comments[3];
    assert!(reply.is_reply);
    assert_eq!(reply.parent_comment_id.as_deref(), Some("c3"));
    assert!(comments[0].parent_comment_id.is_none());
    assert_eq!(comments[0].comment_hash, comments[1].comment_hash);

    // one row per (video, author); `a` appears once per video
    let users = store.read_users().unwrap();
    let rows: Vec<_> = users.iter().map(|u| u.user_unique_id.as_str()).collect();
    assert_eq!(rows, vec!["a", "c", "a"]);
    let a_after_v2 = &users[2];
    assert_eq!(a_after_v2.comment_count, 3);
    assert_eq!(a_after_v2.unique_video_count, 2);
    assert!((a_after_v2.duplicate_ratio - 1.0 / 3.0).abs() < 1e-9);
    assert!((a_after_v2.avg_time_between_comments - 500.0).abs() < 1e-9);
    assert_eq!(a_after_v2.followers_count, 50);

    let seeding = store.read_seeding().unwrap();
    assert_eq!(seeding.len(), comments.len());
    assert!(seeding
        .iter()
        .zip(&comments)
        .all(|(s, c)| s.comment_id == c.comment_id && s.video_id == c.video_id));

    assert_eq!(store.persisted_video_ids().unwrap().len(), 2);
    assert_eq!(src.stream_calls(), vec!["v1".to_string(), "v2".to_string()]);
    // `b` was rejected by the language filter and never looked up
    assert!(!src.profile_calls().contains(&"b".to_string()));
}

#[tokio::test]
async fn rerun_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let urls = [url("v1"), url("v2")];
    {
        let src = Arc::new(two_video_source());
        let mut first = Pipeline::new(test_config(dir.path()), src.clone(), src).unwrap();
        first.run(&urls).await;
    }

    let src = Arc::new(two_video_source());
    let mut second = Pipeline::new(test_config(dir.path()), src.clone(), src.clone()).unwrap();
    let before = second.store().read_comments().unwrap().len();
    let summary = second.run(&urls).await;

    assert_eq!(summary.flushed, 0);
    assert_eq!(summary.skipped, 2);
    assert!(src.stream_calls().is_empty());
    assert!(src.profile_calls().is_empty());
    assert_eq!(second.store().read_comments().unwrap().len(), before);
    assert_eq!(second.tracker().total_comments(), 5);
}

#[tokio::test]
async fn failing_and_idless_videos_do_not_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let src = Arc::new(
        MemorySource::new()
            .with_video(&url("noid"), RawVideoInfo::default())
            .with_video(&url("v1"), video("v1"))
            .with_comments("v1", vec![comment("c1", "a", "hay quá", 0)])
            .with_profile("a", profile(1)),
    );
    let mut pipeline = Pipeline::new(test_config(dir.path()), src.clone(), src).unwrap();

    // "missing" is unknown to the source and fails outright
    let summary = pipeline
        .run(&[url("missing"), url("noid"), url("v1")])
        .await;
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.flushed, 1);
    assert_eq!(pipeline.store().read_comments().unwrap().len(), 1);
}

#[tokio::test]
async fn idless_video_is_reported_as_such() {
    let dir = tempfile::tempdir().unwrap();
    let src = Arc::new(MemorySource::new().with_video(&url("noid"), RawVideoInfo::default()));
    let mut pipeline = Pipeline::new(test_config(dir.path()), src.clone(), src).unwrap();
    let out = pipeline.process_video(&url("noid")).await.unwrap();
    assert_eq!(out, VideoOutcome::Skipped(SkipReason::MissingVideoId));
}

#[tokio::test]
async fn old_videos_are_skipped_when_recency_window_is_set() {
    let dir = tempfile::tempdir().unwrap();
    let mut old = video("old");
    old.create_time = Some(Utc::now().timestamp() - 100 * 86_400);
    let src = Arc::new(
        MemorySource::new()
            .with_video(&url("old"), old)
            .with_comments("old", vec![comment("c1", "a", "hay quá", 0)]),
    );
    let cfg = CollectorConfig {
        time_range_days: 30,
        ..test_config(dir.path())
    };
    let mut pipeline = Pipeline::new(cfg, src.clone(), src.clone()).unwrap();

    let out = pipeline.process_video(&url("old")).await.unwrap();
    assert_eq!(out, VideoOutcome::Skipped(SkipReason::OutsideRecencyWindow));
    assert!(src.stream_calls().is_empty());
    assert!(pipeline.store().read_comments().unwrap().is_empty());
    assert_eq!(pipeline.tracker().processed_count(), 0);
}

#[tokio::test]
async fn comment_stream_is_capped_per_video() {
    let dir = tempfile::tempdir().unwrap();
    let comments = (0..10)
        .map(|i| comment(&format!("c{i}"), "a", &format!("bình luận {i}"), i))
        .collect();
    let src = Arc::new(
        MemorySource::new()
            .with_video(&url("v1"), video("v1"))
            .with_comments("v1", comments)
            .with_profile("a", profile(1)),
    );
    let cfg = CollectorConfig {
        max_comments_per_video: 4,
        ..test_config(dir.path())
    };
    let mut pipeline = Pipeline::new(cfg, src.clone(), src).unwrap();
    pipeline.run(&[url("v1")]).await;
    assert_eq!(pipeline.store().read_comments().unwrap().len(), 4);
}

#[tokio::test]
async fn stats_accumulate_across_videos_into_seeding_scores() {
    let dir = tempfile::tempdir().unwrap();
    let mut src = MemorySource::new().with_profile("seed", profile(10));
    let mut urls = Vec::new();
    for k in 0..6i64 {
        let id = format!("v{k}");
        let comments = (0..2i64)
            .map(|j| comment(&format!("{id}-c{j}"), "seed", "đỉnh quá", (k * 2 + j) * 30))
            .collect();
        src = src
            .with_video(&url(&id), video(&id))
            .with_comments(&id, comments);
        urls.push(url(&id));
    }
    let src = Arc::new(src);
    let mut pipeline = Pipeline::new(test_config(dir.path()), src.clone(), src).unwrap();
    pipeline.run(&urls).await;

    let seeding = pipeline.store().read_seeding().unwrap();
    assert_eq!(seeding.len(), 12);

    // first video: 2 comments, 1 video, ratio exactly 0.5 so not "duplicate"
    let first = explain(&seeding[0]);
    assert_eq!(first.score, 30);
    assert_eq!(
        first.reasons,
        vec!["fast_commenter", "short_text", "no_mention_or_hashtag"]
    );

    // last video sees the whole run: 12 comments on 6 videos, one distinct text
    let last = seeding.last().unwrap();
    assert_eq!(last.user_comment_count_in_dataset, 12);
    assert_eq!(last.user_unique_video_count, 6);
    assert!((last.user_duplicate_ratio - 11.0 / 12.0).abs() < 1e-9);
    assert_eq!(explain(last).score, 75);
}

#[tokio::test]
async fn status_and_analysis_read_back_a_run() {
    use seeding_collector::report::{dataset_status, find_video, write_analysis};

    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let src = Arc::new(two_video_source());
    let mut pipeline = Pipeline::new(cfg.clone(), src.clone(), src).unwrap();
    pipeline.run(&[url("v1"), url("v2")]).await;
    let store = pipeline.store();

    let status = dataset_status(store, &cfg.progress_path()).unwrap();
    assert_eq!(status.video_ids, vec!["v1", "v2"]);
    assert_eq!(status.main_comments, 4);
    assert_eq!(status.reply_comments, 1);
    assert_eq!(status.users, 3);
    assert_eq!(status.seeding_rows, 5);
    assert_eq!(status.progress.as_ref().unwrap().total_comments, 5);

    let v1 = find_video(store, "v1").unwrap().unwrap();
    assert_eq!(v1.description, "video v1");
    assert!(find_video(store, "v9").unwrap().is_none());

    let report = write_analysis(store).unwrap();
    assert_eq!(report.total_comments, 5);
    assert_eq!(report.total_videos, 2);
    assert_eq!(report.total_users, 2);
    assert!(store.dir().join("seeding_analysis_report.txt").exists());
    assert!(store.dir().join("high_risk_comments.csv").exists());
}
