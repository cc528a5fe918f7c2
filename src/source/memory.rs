//! In-memory source for tests and offline replays.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{CommentStream, ProfileFetcher, VideoSource};
use crate::model::{ExternalProfile, RawComment, RawVideoInfo};

#[derive(Debug, Default)]
pub struct MemorySource {
    videos: HashMap<String, RawVideoInfo>,
    comments: HashMap<String, Vec<RawComment>>,
    profiles: HashMap<String, ExternalProfile>,
    failing: HashSet<String>,
    stalled: HashSet<String>,
    broken_streams: HashSet<String>,
    /// Every username passed to `fetch_profile`, in call order.
    profile_calls: Mutex<Vec<String>>,
    /// Every video id passed to `stream_comments`, in call order.
    stream_calls: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_video(mut self, url: &str, info: RawVideoInfo) -> Self {
        self.videos.insert(url.to_string(), info);
        self
    }

    pub fn with_comments(mut self, video_id: &str, comments: Vec<RawComment>) -> Self {
        self.comments.insert(video_id.to_string(), comments);
        self
    }

    pub fn with_profile(mut self, username: &str, profile: ExternalProfile) -> Self {
        self.profiles.insert(username.to_string(), profile);
        self
    }

    /// `fetch_profile(username)` returns an error.
    pub fn failing_profile(mut self, username: &str) -> Self {
        self.failing.insert(username.to_string());
        self
    }

    /// `fetch_profile(username)` never completes (simulates a hung backend).
    pub fn stalled_profile(mut self, username: &str) -> Self {
        self.stalled.insert(username.to_string());
        self
    }

    /// The comment stream of `video_id` fails once its scripted comments run out.
    pub fn broken_stream(mut self, video_id: &str) -> Self {
        self.broken_streams.insert(video_id.to_string());
        self
    }

    pub fn profile_calls(&self) -> Vec<String> {
        self.profile_calls
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn stream_calls(&self) -> Vec<String> {
        self.stream_calls
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl VideoSource for MemorySource {
    async fn fetch_video_info(&self, url: &str) -> Result<RawVideoInfo> {
        self.videos
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("video not found: {url}"))
    }

    async fn stream_comments(
        &self,
        video_id: &str,
        limit: usize,
    ) -> Result<Box<dyn CommentStream>> {
        if let Ok(mut calls) = self.stream_calls.lock() {
            calls.push(video_id.to_string());
        }
        let items: VecDeque<RawComment> = self
            .comments
            .get(video_id)
            .map(|v| v.iter().take(limit).cloned().collect())
            .unwrap_or_default();
        Ok(Box::new(VecCommentStream {
            items,
            broken: self.broken_streams.contains(video_id),
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl ProfileFetcher for MemorySource {
    async fn fetch_profile(&self, username: &str) -> Result<ExternalProfile> {
        if let Ok(mut calls) = self.profile_calls.lock() {
            calls.push(username.to_string());
        }
        if self.stalled.contains(username) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(username) {
            return Err(anyhow!("profile fetch failed for {username}"));
        }
        self.profiles
            .get(username)
            .cloned()
            .ok_or_else(|| anyhow!("unknown user {username}"))
    }
}

struct VecCommentStream {
    items: VecDeque<RawComment>,
    broken: bool,
}

#[async_trait]
impl CommentStream for VecCommentStream {
    async fn next_comment(&mut self) -> Result<Option<RawComment>> {
        match self.items.pop_front() {
            None if self.broken => Err(anyhow!("connection reset while paging comments")),
            next => Ok(next),
        }
    }
}
