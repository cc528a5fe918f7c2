//! # Video collector
//! Per-video session: video metadata, the accepted comments, and the authors
//! seen on this video. Short-lived; dropped once its rows are flushed.
//!
//! Lifecycle (each step requires the previous one):
//! `Empty -> VideoSet -> CommentsCollected -> UsersFinalized -> Flushed`
//!
//! Nothing touches the outputs before `flush`, so abandoning a collector at
//! any earlier step leaves no trace on disk. Accepted comments are recorded
//! in the run-wide aggregator right away (later authors' stats need them);
//! a collector dropped before `Flushed` takes those observations back.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use metrics::counter;

use crate::aggregate::{Observation, UserAggregator};
use crate::model::{
    unix_or_epoch, CommentRecord, ExternalProfile, RawComment, RawVideoInfo, SeedingRecord,
    UserIdentity, UserProfile, VideoRecord,
};
use crate::output::{OutputStore, VideoBatch};
use crate::source::ProfileFetcher;
use crate::text::{content_hash, detect_language, extract_features};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Empty,
    VideoSet,
    CommentsCollected,
    UsersFinalized,
    Flushed,
}

/// Outcome of profile enrichment for one video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinalizeSummary {
    pub users: usize,
    /// Fetches that failed; those users keep default external fields.
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushSummary {
    pub video_id: String,
    pub comments: usize,
    pub users: usize,
}

pub struct VideoCollector<'a> {
    aggregator: &'a mut UserAggregator,
    state: CollectorState,
    video: Option<VideoRecord>,
    comments: Vec<CommentRecord>,
    // first-seen order, indexed by user_unique_id
    identities: Vec<UserIdentity>,
    identity_index: HashMap<String, usize>,
    profiles: Vec<UserProfile>,
    rejected: usize,
    // aggregator length per author before this video's first observation
    checkpoints: HashMap<String, usize>,
}

impl<'a> VideoCollector<'a> {
    pub fn new(aggregator: &'a mut UserAggregator) -> Self {
        Self {
            aggregator,
            state: CollectorState::Empty,
            video: None,
            comments: Vec::new(),
            identities: Vec::new(),
            identity_index: HashMap::new(),
            profiles: Vec::new(),
            rejected: 0,
            checkpoints: HashMap::new(),
        }
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    pub fn comments(&self) -> &[CommentRecord] {
        &self.comments
    }

    /// Distinct authors seen on this video.
    pub fn user_count(&self) -> usize {
        self.identities.len()
    }

    /// Comments dropped by the language filter.
    pub fn rejected_count(&self) -> usize {
        self.rejected
    }

    /// Map the provider payload. Returns the video id, or `None` (and stays
    /// `Empty`) when the provider supplied no id.
    pub fn set_video(&mut self, raw: &RawVideoInfo, source_url: &str) -> Result<Option<String>> {
        self.expect_state(CollectorState::Empty, "set_video")?;
        let Some(video) = VideoRecord::from_raw(raw, source_url) else {
            return Ok(None);
        };
        let id = video.video_id.clone();
        self.video = Some(video);
        self.state = CollectorState::VideoSet;
        Ok(Some(id))
    }

    /// Accept or drop one comment. Dropped comments (language filter) have no
    /// side effects beyond the rejection counter.
    pub fn add_comment(
        &mut self,
        raw: &RawComment,
        video_id: &str,
        is_reply: bool,
        parent_id: Option<&str>,
    ) -> Result<Option<&CommentRecord>> {
        self.expect_state(CollectorState::VideoSet, "add_comment")?;
        if self.video.as_ref().map(|v| v.video_id.as_str()) != Some(video_id) {
            bail!("comment for video {video_id} added to a different video's collector");
        }

        if !detect_language(&raw.text) {
            self.rejected += 1;
            counter!("collector_comments_rejected_total").increment(1);
            return Ok(None);
        }

        let timestamp = raw.create_time.map(unix_or_epoch).unwrap_or_else(Utc::now);
        let features = extract_features(&raw.text);
        let author = &raw.user;
        let user_id = author.uid.clone().unwrap_or_default();

        let record = CommentRecord {
            comment_id: raw.cid.clone().unwrap_or_default(),
            video_id: video_id.to_string(),
            comment_text: raw.text.clone(),
            like_count: raw.digg_count,
            timestamp,
            user_id: user_id.clone(),
            user_unique_id: author.unique_id.clone(),
            reply_count: raw.reply_comment_total,
            comment_hash: content_hash(&raw.text),
            text_length: features.text_length,
            has_emoji: features.has_emoji,
            has_mention: features.has_mention,
            has_hashtag: features.has_hashtag,
            is_reply,
            parent_comment_id: parent_id.map(str::to_string),
        };

        // anonymous comments are kept but not attributed to any user
        if !author.unique_id.is_empty() {
            if !self.identity_index.contains_key(&author.unique_id) {
                self.identity_index
                    .insert(author.unique_id.clone(), self.identities.len());
                self.identities.push(UserIdentity {
                    user_id,
                    user_unique_id: author.unique_id.clone(),
                    nickname: author.nickname.clone(),
                });
            }
            if !self.checkpoints.contains_key(&author.unique_id) {
                let mark = self.aggregator.observations_of(&author.unique_id);
                self.checkpoints.insert(author.unique_id.clone(), mark);
            }
            self.aggregator.record(
                &author.unique_id,
                Observation {
                    text: raw.text.clone(),
                    timestamp,
                    video_id: video_id.to_string(),
                },
            );
        }

        counter!("collector_comments_kept_total").increment(1);
        self.comments.push(record);
        Ok(self.comments.last())
    }

    /// No more comments for this video.
    pub fn close_comments(&mut self) -> Result<()> {
        self.expect_state(CollectorState::VideoSet, "close_comments")?;
        self.state = CollectorState::CommentsCollected;
        Ok(())
    }

    /// Merge run-wide statistics with fetched profile data for every author of
    /// this video, one fetch at a time with `pacing` between calls. Fetch
    /// failures leave the external fields at their defaults.
    pub async fn finalize_users(
        &mut self,
        fetcher: &dyn ProfileFetcher,
        pacing: Duration,
    ) -> Result<FinalizeSummary> {
        self.expect_state(CollectorState::CommentsCollected, "finalize_users")?;

        let total = self.identities.len();
        let mut summary = FinalizeSummary::default();
        let mut profiles = Vec::with_capacity(total);

        for (i, identity) in self.identities.iter().enumerate() {
            if i > 0 && !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
            let stats = self.aggregator.compute_stats(&identity.user_unique_id);
            let external = match fetcher.fetch_profile(&identity.user_unique_id).await {
                Ok(p) => p,
                Err(e) => {
                    summary.failed += 1;
                    counter!("collector_profile_failures_total").increment(1);
                    tracing::warn!(
                        user = %identity.user_unique_id,
                        error = %format!("{e:#}"),
                        "profile fetch failed; keeping defaults"
                    );
                    ExternalProfile::default()
                }
            };
            profiles.push(UserProfile::assemble(identity, &stats, &external));
            summary.users += 1;

            if summary.users % 10 == 0 {
                tracing::info!(done = summary.users, total, failed = summary.failed, "profiles");
            }
        }

        self.profiles = profiles;
        self.state = CollectorState::UsersFinalized;
        Ok(summary)
    }

    /// One joined row per buffered comment, in comment order.
    pub fn build_seeding_records(&self) -> Result<Vec<SeedingRecord>> {
        self.expect_state(CollectorState::UsersFinalized, "build_seeding_records")?;
        let Some(video) = self.video.as_ref() else {
            bail!("finalized collector without a video");
        };
        Ok(self
            .comments
            .iter()
            .map(|c| {
                let profile = self
                    .identity_index
                    .get(&c.user_unique_id)
                    .and_then(|&i| self.profiles.get(i));
                SeedingRecord::join(video, c, profile)
            })
            .collect())
    }

    /// Append all four record sets. On success the collector is `Flushed`.
    pub fn flush(&mut self, store: &OutputStore) -> Result<FlushSummary> {
        let seeding = self.build_seeding_records()?;
        let Some(video) = self.video.as_ref() else {
            bail!("finalized collector without a video");
        };
        store.write_video_batch(&VideoBatch {
            video,
            comments: &self.comments,
            users: &self.profiles,
            seeding: &seeding,
        })?;
        let summary = FlushSummary {
            video_id: video.video_id.clone(),
            comments: self.comments.len(),
            users: self.identities.len(),
        };
        self.state = CollectorState::Flushed;
        Ok(summary)
    }

    fn expect_state(&self, want: CollectorState, op: &str) -> Result<()> {
        if self.state != want {
            bail!("{op} requires state {want:?}, collector is {:?}", self.state);
        }
        Ok(())
    }
}

impl Drop for VideoCollector<'_> {
    fn drop(&mut self) {
        if self.state == CollectorState::Flushed || self.checkpoints.is_empty() {
            return;
        }
        for (user, mark) in self.checkpoints.drain() {
            self.aggregator.truncate(&user, mark);
        }
        tracing::debug!(
            comments = self.comments.len(),
            state = ?self.state,
            "unflushed video dropped; observations rolled back"
        );
    }
}
