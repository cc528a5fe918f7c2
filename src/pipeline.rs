//! Collection run: one video at a time, persisted after each video.
//!
//! Per video: fetch info -> skip checks -> pull comments (then inlined
//! replies) -> enrich authors -> flush four outputs -> register progress.
//! A failing video is logged and the run moves on; only the stopping
//! conditions or the end of the URL list end a run.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use metrics::{counter, gauge};
use rand::Rng;
use tracing::{error, info, warn};

use crate::aggregate::UserAggregator;
use crate::collector::{FlushSummary, VideoCollector};
use crate::config::CollectorConfig;
use crate::model::RawComment;
use crate::output::OutputStore;
use crate::progress::{ProcessedCheck, ProgressTracker};
use crate::source::{ProfileFetcher, VideoSource};
use crate::telemetry::ensure_metrics_described;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Provider returned no video id.
    MissingVideoId,
    /// Already in the durable progress set.
    AlreadyProcessed,
    /// Found in the video output only; progress was re-registered from the outputs.
    RecoveredFromOutput,
    /// Older than the configured recency window.
    OutsideRecencyWindow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoOutcome {
    Flushed(FlushSummary),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    MaxVideos,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub flushed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub stop: StopReason,
    pub processed_videos: usize,
    pub total_comments: u64,
    pub total_users: u64,
}

pub struct Pipeline {
    cfg: CollectorConfig,
    source: Arc<dyn VideoSource>,
    profiles: Arc<dyn ProfileFetcher>,
    store: OutputStore,
    tracker: ProgressTracker,
    aggregator: UserAggregator,
}

impl Pipeline {
    /// Open outputs (writing missing headers) and load progress.
    /// Every pipeline starts with an empty user aggregate.
    pub fn new(
        cfg: CollectorConfig,
        source: Arc<dyn VideoSource>,
        profiles: Arc<dyn ProfileFetcher>,
    ) -> Result<Self> {
        let store = OutputStore::open(&cfg.output_dir)?;
        let tracker = ProgressTracker::load(&cfg.progress_path());
        Ok(Self {
            cfg,
            source,
            profiles,
            store,
            tracker,
            aggregator: UserAggregator::new(),
        })
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub async fn run(&mut self, urls: &[String]) -> RunSummary {
        ensure_metrics_described();
        info!(
            source = self.source.name(),
            videos = urls.len(),
            target = self.cfg.target_comment_count,
            resume_from = self.tracker.total_comments(),
            "collector starting"
        );

        let (mut flushed, mut skipped, mut failed) = (0, 0, 0);
        let mut stop = StopReason::Exhausted;

        for (idx, url) in urls.iter().enumerate() {
            if self.tracker.total_comments() >= self.cfg.target_comment_count {
                info!(target = self.cfg.target_comment_count, "target comment count reached");
                stop = StopReason::TargetReached;
                break;
            }
            if self.tracker.processed_count() >= self.cfg.max_videos {
                info!(max_videos = self.cfg.max_videos, "max videos reached");
                stop = StopReason::MaxVideos;
                break;
            }

            info!(
                video = idx + 1,
                of = urls.len(),
                %url,
                comments = self.tracker.total_comments(),
                target = self.cfg.target_comment_count,
                "processing video"
            );
            match self.process_video(url).await {
                Ok(VideoOutcome::Flushed(f)) => {
                    flushed += 1;
                    counter!("collector_videos_flushed_total").increment(1);
                    info!(
                        video_id = %f.video_id,
                        comments = f.comments,
                        users = f.users,
                        processed = self.tracker.processed_count(),
                        total_comments = self.tracker.total_comments(),
                        "video completed"
                    );
                }
                Ok(VideoOutcome::Skipped(reason)) => {
                    skipped += 1;
                    counter!("collector_videos_skipped_total").increment(1);
                    info!(%url, ?reason, "video skipped");
                }
                Err(e) => {
                    failed += 1;
                    counter!("collector_video_errors_total").increment(1);
                    error!(%url, error = %format!("{e:#}"), "fatal error processing video");
                }
            }

            let more = idx + 1 < urls.len();
            if more && self.tracker.total_comments() < self.cfg.target_comment_count {
                let delay = jitter(self.cfg.video_delay_min_ms, self.cfg.video_delay_max_ms);
                if !delay.is_zero() {
                    info!(secs = delay.as_secs_f32(), "waiting before next video");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        let state = self.tracker.state();
        let summary = RunSummary {
            flushed,
            skipped,
            failed,
            stop,
            processed_videos: state.processed_videos.len(),
            total_comments: state.total_comments,
            total_users: state.total_users,
        };
        info!(?summary, output = %self.store.dir().display(), "collector finished");
        summary
    }

    /// Run one video through the collector. `Err` is a fatal per-video failure;
    /// in every non-`Flushed` case nothing was written and the run-wide user
    /// stats are as they were before the call.
    pub async fn process_video(&mut self, url: &str) -> Result<VideoOutcome> {
        let raw_video = self
            .source
            .fetch_video_info(url)
            .await
            .with_context(|| format!("fetching video info for {url}"))?;

        let mut collector = VideoCollector::new(&mut self.aggregator);
        let Some(video_id) = collector.set_video(&raw_video, url)? else {
            warn!(%url, "provider returned no video id");
            return Ok(VideoOutcome::Skipped(SkipReason::MissingVideoId));
        };

        match self.tracker.is_processed(&video_id, &self.store) {
            ProcessedCheck::Processed => {
                return Ok(VideoOutcome::Skipped(SkipReason::AlreadyProcessed));
            }
            ProcessedCheck::OutputOnly => {
                reconcile_from_output(&mut self.tracker, &self.store, &video_id);
                return Ok(VideoOutcome::Skipped(SkipReason::RecoveredFromOutput));
            }
            ProcessedCheck::NotProcessed => {}
        }

        if self.cfg.time_range_days > 0 {
            if let Some(created) = raw_video.create_time.filter(|ts| *ts > 0) {
                let cutoff = Utc::now().timestamp() - i64::from(self.cfg.time_range_days) * 86_400;
                if created < cutoff {
                    return Ok(VideoOutcome::Skipped(SkipReason::OutsideRecencyWindow));
                }
            }
        }

        // comments, then the replies inlined under accepted top-level comments
        let limit = self.cfg.max_comments_per_video;
        let mut stream = self
            .source
            .stream_comments(&video_id, limit)
            .await
            .with_context(|| format!("opening comment stream for {video_id}"))?;

        let mut pulled = 0usize;
        let mut pending_replies: Vec<(String, Vec<RawComment>)> = Vec::new();
        while pulled < limit {
            let Some(raw) = stream
                .next_comment()
                .await
                .with_context(|| format!("reading comments of {video_id}"))?
            else {
                break;
            };
            pulled += 1;

            let Some(parent_id) = collector
                .add_comment(&raw, &video_id, false, None)?
                .map(|c| c.comment_id.clone())
            else {
                continue;
            };

            if raw.reply_comment_total > 0 {
                match raw.reply_comment {
                    Some(replies) if !replies.is_empty() => pending_replies.push((parent_id, replies)),
                    _ => {
                        counter!("collector_replies_missing_total").increment(1);
                        info!(
                            comment_id = %parent_id,
                            replies = raw.reply_comment_total,
                            "replies reported but not inlined"
                        );
                    }
                }
            }

            let kept = collector.comments().len();
            if kept % 50 == 0 {
                info!(%video_id, kept, "collected comments so far");
            }
        }
        drop(stream);

        for (parent_id, replies) in &pending_replies {
            for reply in replies {
                collector.add_comment(reply, &video_id, true, Some(parent_id))?;
            }
        }
        collector.close_comments()?;
        info!(
            %video_id,
            comments = collector.comments().len(),
            rejected = collector.rejected_count(),
            users = collector.user_count(),
            "comments collected"
        );

        let pacing = Duration::from_millis(self.cfg.profile_delay_ms);
        let fin = collector
            .finalize_users(self.profiles.as_ref(), pacing)
            .await?;
        info!(%video_id, users = fin.users, failed = fin.failed, "users finalized");

        let flushed = collector.flush(&self.store)?;

        if let Err(e) = self.tracker.mark_processed(
            &flushed.video_id,
            flushed.comments as u64,
            flushed.users as u64,
        ) {
            counter!("collector_progress_write_failures_total").increment(1);
            warn!(video_id = %flushed.video_id, error = %format!("{e:#}"), "progress not persisted");
        }
        gauge!("collector_total_comments").set(self.tracker.total_comments() as f64);

        Ok(VideoOutcome::Flushed(flushed))
    }
}

/// Register a video the outputs already hold, with counts recomputed from the comments file.
fn reconcile_from_output(tracker: &mut ProgressTracker, store: &OutputStore, video_id: &str) {
    let (comments, users) = match store.recount(video_id) {
        Ok(c) => c,
        Err(e) => {
            warn!(%video_id, error = %format!("{e:#}"), "recount failed; registering with zero counts");
            (0, 0)
        }
    };
    warn!(%video_id, comments, users, "video present in outputs but not in progress; re-registering");
    if let Err(e) = tracker.mark_processed(video_id, comments, users) {
        counter!("collector_progress_write_failures_total").increment(1);
        warn!(%video_id, error = %format!("{e:#}"), "progress not persisted");
    }
}

/// Uniform delay in `[min_ms, max_ms]`.
fn jitter(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let ms = if min_ms >= max_ms {
        max_ms
    } else {
        rand::rng().random_range(min_ms..=max_ms)
    };
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_in_range() {
        assert_eq!(jitter(0, 0), Duration::ZERO);
        assert_eq!(jitter(7, 7), Duration::from_millis(7));
        for _ in 0..100 {
            let d = jitter(3_000, 5_000).as_millis();
            assert!((3_000..=5_000).contains(&d));
        }
    }
}
