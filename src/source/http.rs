//! HTTP client for the browser-automation sidecar.
//!
//! The sidecar owns the browser sessions and exposes three JSON endpoints:
//! - `GET /video?url=..`                          -> raw video info
//! - `GET /comments?video_id=..&cursor=..&count=..` -> `{comments, cursor, has_more}`
//! - `GET /user?username=..`                      -> raw user info

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;

use super::{CommentStream, ProfileFetcher, VideoSource};
use crate::config::SourceConfig;
use crate::model::{ExternalProfile, RawComment, RawUserInfo, RawVideoInfo};

/// Comments requested per page; the sidecar may return fewer.
const PAGE_SIZE: usize = 50;

#[derive(Debug, Clone)]
pub struct HttpSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(cfg: &SourceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("seeding-collector/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()
            .context("building http client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        http: &reqwest::Client,
        url: String,
        query: &[(&str, String)],
    ) -> Result<T> {
        let resp = http
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url} status"))?;
        resp.json::<T>()
            .await
            .with_context(|| format!("decoding {url} body"))
    }
}

#[async_trait]
impl VideoSource for HttpSource {
    async fn fetch_video_info(&self, url: &str) -> Result<RawVideoInfo> {
        Self::get_json(
            &self.http,
            format!("{}/video", self.base_url),
            &[("url", url.to_string())],
        )
        .await
    }

    async fn stream_comments(
        &self,
        video_id: &str,
        limit: usize,
    ) -> Result<Box<dyn CommentStream>> {
        Ok(Box::new(HttpCommentStream {
            http: self.http.clone(),
            endpoint: format!("{}/comments", self.base_url),
            video_id: video_id.to_string(),
            cursor: None,
            has_more: true,
            remaining: limit,
            buf: VecDeque::new(),
        }))
    }

    fn name(&self) -> &'static str {
        "http-sidecar"
    }
}

#[async_trait]
impl ProfileFetcher for HttpSource {
    async fn fetch_profile(&self, username: &str) -> Result<ExternalProfile> {
        let raw: RawUserInfo = Self::get_json(
            &self.http,
            format!("{}/user", self.base_url),
            &[("username", username.to_string())],
        )
        .await?;
        Ok(ExternalProfile::from_raw(&raw, chrono::Utc::now()))
    }
}

#[derive(Debug, Deserialize)]
struct CommentPage {
    #[serde(default)]
    comments: Vec<RawComment>,
    #[serde(default)]
    cursor: u64,
    #[serde(default)]
    has_more: bool,
}

impl CommentPage {
    /// An empty page, or a cursor equal to the one the previous page
    /// returned, ends the stream. The first page may return any cursor.
    fn continues_after(&self, prev_cursor: Option<u64>) -> bool {
        self.has_more && !self.comments.is_empty() && prev_cursor != Some(self.cursor)
    }
}

/// Cursor-paginated stream; fetches the next page only when the buffer drains.
struct HttpCommentStream {
    http: reqwest::Client,
    endpoint: String,
    video_id: String,
    // cursor returned by the last page; `None` before the first fetch
    cursor: Option<u64>,
    has_more: bool,
    remaining: usize,
    buf: VecDeque<RawComment>,
}

impl HttpCommentStream {
    async fn fetch_page(&mut self) -> Result<()> {
        let count = self.remaining.min(PAGE_SIZE);
        let page: CommentPage = HttpSource::get_json(
            &self.http,
            self.endpoint.clone(),
            &[
                ("video_id", self.video_id.clone()),
                ("cursor", self.cursor.unwrap_or(0).to_string()),
                ("count", count.to_string()),
            ],
        )
        .await?;

        counter!("collector_comment_pages_total").increment(1);
        self.has_more = page.continues_after(self.cursor);
        self.cursor = Some(page.cursor);
        self.buf.extend(page.comments);
        Ok(())
    }
}

#[async_trait]
impl CommentStream for HttpCommentStream {
    async fn next_comment(&mut self) -> Result<Option<RawComment>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        if self.buf.is_empty() && self.has_more {
            self.fetch_page()
                .await
                .with_context(|| format!("comment page for video {}", self.video_id))?;
        }
        match self.buf.pop_front() {
            Some(c) => {
                self.remaining -= 1;
                Ok(Some(c))
            }
            None => Ok(None),
        }
    }
}
