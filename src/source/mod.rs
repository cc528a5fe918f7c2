// src/source/mod.rs
//! Seams to the scraping backend. The core only ever sees these traits.

pub mod http;
pub mod memory;

use anyhow::Result;

use crate::model::{ExternalProfile, RawComment, RawVideoInfo};

/// Pull-based, finite, non-restartable sequence of raw comments.
#[async_trait::async_trait]
pub trait CommentStream: Send {
    /// Next comment, or `Ok(None)` once the stream is exhausted.
    async fn next_comment(&mut self) -> Result<Option<RawComment>>;
}

#[async_trait::async_trait]
pub trait VideoSource: Send + Sync {
    async fn fetch_video_info(&self, url: &str) -> Result<RawVideoInfo>;

    /// Start a fresh comment stream for `video_id`, yielding at most `limit` items.
    async fn stream_comments(
        &self,
        video_id: &str,
        limit: usize,
    ) -> Result<Box<dyn CommentStream>>;

    fn name(&self) -> &'static str;
}

/// Fetch-or-fail profile enrichment. Callers treat `Err` as transient.
#[async_trait::async_trait]
pub trait ProfileFetcher: Send + Sync {
    async fn fetch_profile(&self, username: &str) -> Result<ExternalProfile>;
}
