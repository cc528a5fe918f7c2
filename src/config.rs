// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_PATH: &str = "SEEDING_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/collector.toml";

/// Static bounds and paths for one collection run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Stop once this many comments have been collected (across runs).
    pub target_comment_count: u64,
    /// Cap on raw comments pulled from one video's stream.
    pub max_comments_per_video: usize,
    /// Stop once this many videos are in the processed set.
    pub max_videos: usize,
    /// Skip videos older than this many days; 0 disables the check.
    pub time_range_days: u32,
    pub output_dir: PathBuf,
    pub video_urls_path: PathBuf,
    /// Defaults to `<output_dir>/scraping_progress.json`.
    pub progress_file: Option<PathBuf>,
    /// Minimum pause between two profile fetches.
    pub profile_delay_ms: u64,
    pub video_delay_min_ms: u64,
    pub video_delay_max_ms: u64,
    pub source: SourceConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            target_comment_count: 10_000,
            max_comments_per_video: 1_000,
            max_videos: 300,
            time_range_days: 90,
            output_dir: PathBuf::from("Dataset"),
            video_urls_path: PathBuf::from("video_urls.txt"),
            progress_file: None,
            profile_delay_ms: 500,
            video_delay_min_ms: 3_000,
            video_delay_max_ms: 5_000,
            source: SourceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URL of the browser-automation sidecar.
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8790".to_string(),
            timeout_secs: 30,
        }
    }
}

impl CollectorConfig {
    pub fn progress_path(&self) -> PathBuf {
        self.progress_file
            .clone()
            .unwrap_or_else(|| self.output_dir.join("scraping_progress.json"))
    }

    /// Fix values that would stall or invert the run.
    fn sanitized(mut self) -> Self {
        if self.max_comments_per_video == 0 {
            self.max_comments_per_video = 1;
        }
        if self.video_delay_min_ms > self.video_delay_max_ms {
            std::mem::swap(&mut self.video_delay_min_ms, &mut self.video_delay_max_ms);
        }
        self
    }
}

/// Load config from an explicit TOML file.
pub fn load_config_from(path: &Path) -> Result<CollectorConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading collector config from {}", path.display()))?;
    parse_config(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Load config using env var + fallbacks:
/// 1) $SEEDING_CONFIG_PATH
/// 2) config/collector.toml
/// 3) built-in defaults
pub fn load_config_default() -> Result<CollectorConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        } else {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from(DEFAULT_CONFIG_PATH);
    if toml_p.exists() {
        return load_config_from(&toml_p);
    }
    Ok(CollectorConfig::default())
}

fn parse_config(s: &str) -> Result<CollectorConfig> {
    let cfg: CollectorConfig = toml::from_str(s)?;
    Ok(cfg.sanitized())
}

/// One URL per line; blank lines and `#` comments are skipped.
/// A missing file is logged and yields an empty list.
pub fn load_video_urls(path: &Path) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let urls = parse_video_urls(&content);
            tracing::info!(count = urls.len(), path = %path.display(), "loaded video urls");
            urls
        }
        Err(e) => {
            tracing::error!(error = %e, path = %path.display(), "video url list not readable");
            Vec::new()
        }
    }
}

fn parse_video_urls(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}
