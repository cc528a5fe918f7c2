//! progress.rs: durable record of finished videos and cumulative counters.
//!
//! JSON shape:
//! {
//!   "processed_videos": ["7301...", "7302..."],
//!   "total_comments": 1234,
//!   "total_users": 456
//! }
//!
//! Updates go to a sibling temp file which is then renamed over the original,
//! so a failed or interrupted write leaves the previous document intact.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::output::OutputStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    #[serde(default)]
    pub processed_videos: Vec<String>,
    #[serde(default)]
    pub total_comments: u64,
    #[serde(default)]
    pub total_users: u64,
}

/// Where a video id was found when checking whether to skip it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessedCheck {
    NotProcessed,
    /// In the durable progress set; counters already include it.
    Processed,
    /// Only in the video output; the progress file fell behind (crash between
    /// flush and progress write).
    OutputOnly,
}

#[derive(Debug)]
pub struct ProgressTracker {
    path: PathBuf,
    state: ProgressState,
    index: HashSet<String>,
}

impl ProgressTracker {
    /// Load from `path`. A missing file starts empty; an unreadable one is
    /// logged and also starts empty (the outputs still guard against re-runs).
    pub fn load(path: &Path) -> Self {
        let state = match fs::read_to_string(path) {
            Ok(s) => match serde_json::from_str::<ProgressState>(&s) {
                Ok(st) => st,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        path = %path.display(),
                        "progress file unreadable; starting empty"
                    );
                    ProgressState::default()
                }
            },
            Err(_) => ProgressState::default(),
        };
        let index = state.processed_videos.iter().cloned().collect();
        Self {
            path: path.to_path_buf(),
            state,
            index,
        }
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    pub fn processed_count(&self) -> usize {
        self.state.processed_videos.len()
    }

    pub fn total_comments(&self) -> u64 {
        self.state.total_comments
    }

    /// Check the durable set first, then the persisted video rows.
    pub fn is_processed(&self, video_id: &str, store: &OutputStore) -> ProcessedCheck {
        if self.index.contains(video_id) {
            return ProcessedCheck::Processed;
        }
        match store.persisted_video_ids() {
            Ok(ids) if ids.contains(video_id) => ProcessedCheck::OutputOnly,
            Ok(_) => ProcessedCheck::NotProcessed,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), video_id, "checking persisted videos failed");
                ProcessedCheck::NotProcessed
            }
        }
    }

    /// Register a flushed video and persist. The in-memory state is always
    /// updated; an `Err` means only the file write failed and the previous
    /// file content is still in place.
    pub fn mark_processed(
        &mut self,
        video_id: &str,
        comment_delta: u64,
        user_delta: u64,
    ) -> Result<()> {
        if self.index.insert(video_id.to_string()) {
            self.state.processed_videos.push(video_id.to_string());
            self.state.total_comments += comment_delta;
            self.state.total_users += user_delta;
        }
        write_atomic(&self.path, &self.state)
    }
}

fn write_atomic(path: &Path, state: &ProgressState) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let body = serde_json::to_vec_pretty(state).context("encoding progress")?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut f = fs::File::create(&tmp)
            .with_context(|| format!("creating {}", tmp.display()))?;
        f.write_all(&body)
            .with_context(|| format!("writing {}", tmp.display()))?;
        f.sync_all()
            .with_context(|| format!("syncing {}", tmp.display()))?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
