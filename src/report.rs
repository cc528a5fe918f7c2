//! Offline views over the outputs: the seeding analysis report and the dataset status.
//!
//! `analyze` scores every row of the seeding dataset and summarizes the
//! suspicious patterns; `write_analysis` also drops a text report and the
//! high-risk rows next to the dataset. `dataset_status` / `find_video`
//! answer "what has been collected so far".

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{ts_format, SeedingRecord};
use crate::output::OutputStore;
use crate::progress::{ProgressState, ProgressTracker};
use crate::scoring::{explain, HIGH_RISK_THRESHOLD};

pub const REPORT_FILE: &str = "seeding_analysis_report.txt";
pub const HIGH_RISK_FILE: &str = "high_risk_comments.csv";

/// Substrings of low-effort praise, matched against the lowercased text.
pub const GENERIC_PHRASES: &[&str] = &[
    "hay quá",
    "tuyệt vời",
    "quá đỉnh",
    "xuất sắc",
    "ok",
    "good",
    "nice",
];

const TOP_USERS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct SuspiciousUser {
    pub user_unique_id: String,
    pub mean_score: f64,
    pub comment_count: usize,
    pub duplicate_ratio: f64,
    pub followers_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub total_comments: usize,
    pub total_users: usize,
    pub total_videos: usize,

    // distinct users
    pub high_duplicate_users: usize,
    pub multi_video_users: usize,
    pub fast_commenters: usize,
    pub low_follower_high_volume: usize,

    // rows
    pub short_comments: usize,
    pub emoji_short_comments: usize,
    pub generic_praise_comments: usize,
    /// Content hashes seen on more than one video.
    pub cross_video_duplicates: usize,

    pub high_risk_comments: usize,
    pub high_risk_users: usize,
    pub mean_score: f64,
    pub top_users: Vec<SuspiciousUser>,
}

/// One exported high-risk comment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighRiskRow {
    pub video_id: String,
    pub comment_id: String,
    pub user_unique_id: String,
    pub comment_text: String,
    #[serde(with = "ts_format")]
    pub comment_timestamp: DateTime<Utc>,
    pub user_followers_count: u64,
    pub user_comment_count_in_dataset: usize,
    pub user_duplicate_ratio: f64,
    pub seeding_score: u8,
    /// Fired rule names, `;`-separated.
    pub reasons: String,
}

pub fn analyze(records: &[SeedingRecord], now: DateTime<Utc>) -> (AnalysisReport, Vec<HighRiskRow>) {
    let mut users = HashSet::new();
    let mut videos = HashSet::new();
    let mut high_duplicate = HashSet::new();
    let mut fast = HashSet::new();
    let mut low_follower = HashSet::new();
    let mut user_videos: HashMap<&str, HashSet<&str>> = HashMap::new();
    let mut hash_videos: HashMap<&str, HashSet<&str>> = HashMap::new();
    // user -> (score sum, rows, first row)
    let mut user_scores: HashMap<&str, (u64, usize, &SeedingRecord)> = HashMap::new();

    let (mut short, mut emoji_short, mut generic) = (0, 0, 0);
    let mut high_risk = Vec::new();
    let mut high_risk_users = HashSet::new();
    let mut score_sum = 0u64;

    for r in records {
        let user = r.user_unique_id.as_str();
        let known_user = !user.is_empty();
        videos.insert(r.video_id.as_str());
        hash_videos
            .entry(r.comment_hash.as_str())
            .or_default()
            .insert(r.video_id.as_str());

        if known_user {
            users.insert(user);
            user_videos.entry(user).or_default().insert(r.video_id.as_str());
            if r.user_duplicate_ratio > 0.5 {
                high_duplicate.insert(user);
            }
            if r.user_avg_time_between_comments < 60.0 {
                fast.insert(user);
            }
            if r.user_followers_count < 100 && r.user_comment_count_in_dataset > 10 {
                low_follower.insert(user);
            }
        }

        if r.text_length < 20 {
            short += 1;
        }
        if r.has_emoji && r.text_length < 10 {
            emoji_short += 1;
        }
        let lowered = r.comment_text.to_lowercase();
        if GENERIC_PHRASES.iter().any(|p| lowered.contains(p)) {
            generic += 1;
        }

        let breakdown = explain(r);
        score_sum += u64::from(breakdown.score);
        if known_user {
            let entry = user_scores.entry(user).or_insert((0, 0, r));
            entry.0 += u64::from(breakdown.score);
            entry.1 += 1;
        }
        if breakdown.score >= HIGH_RISK_THRESHOLD {
            if known_user {
                high_risk_users.insert(user);
            }
            high_risk.push(HighRiskRow {
                video_id: r.video_id.clone(),
                comment_id: r.comment_id.clone(),
                user_unique_id: r.user_unique_id.clone(),
                comment_text: r.comment_text.clone(),
                comment_timestamp: r.comment_timestamp,
                user_followers_count: r.user_followers_count,
                user_comment_count_in_dataset: r.user_comment_count_in_dataset,
                user_duplicate_ratio: r.user_duplicate_ratio,
                seeding_score: breakdown.score,
                reasons: breakdown.reasons.join(";"),
            });
        }
    }

    let mut top_users: Vec<SuspiciousUser> = user_scores
        .into_iter()
        .map(|(user, (sum, n, first))| SuspiciousUser {
            user_unique_id: user.to_string(),
            mean_score: sum as f64 / n as f64,
            comment_count: first.user_comment_count_in_dataset,
            duplicate_ratio: first.user_duplicate_ratio,
            followers_count: first.user_followers_count,
        })
        .collect();
    top_users.sort_by(|a, b| {
        b.mean_score
            .total_cmp(&a.mean_score)
            .then_with(|| a.user_unique_id.cmp(&b.user_unique_id))
    });
    top_users.truncate(TOP_USERS);

    let report = AnalysisReport {
        generated_at: now,
        total_comments: records.len(),
        total_users: users.len(),
        total_videos: videos.len(),
        high_duplicate_users: high_duplicate.len(),
        multi_video_users: user_videos.values().filter(|v| v.len() > 3).count(),
        fast_commenters: fast.len(),
        low_follower_high_volume: low_follower.len(),
        short_comments: short,
        emoji_short_comments: emoji_short,
        generic_praise_comments: generic,
        cross_video_duplicates: hash_videos.values().filter(|v| v.len() > 1).count(),
        high_risk_comments: high_risk.len(),
        high_risk_users: high_risk_users.len(),
        mean_score: if records.is_empty() {
            0.0
        } else {
            score_sum as f64 / records.len() as f64
        },
        top_users,
    };
    (report, high_risk)
}

fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(30);
        writeln!(f, "TIKTOK SEEDING ANALYSIS REPORT")?;
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f)?;
        writeln!(f, "Analysis Date: {}", self.generated_at.format(ts_format::FORMAT))?;
        writeln!(f, "Total Comments Analyzed: {}", self.total_comments)?;
        writeln!(f, "Total Users: {}", self.total_users)?;
        writeln!(f, "Total Videos: {}", self.total_videos)?;
        writeln!(f)?;

        writeln!(f, "SUSPICIOUS USER PATTERNS\n{rule}")?;
        writeln!(f, "High duplicate ratio users: {}", self.high_duplicate_users)?;
        writeln!(f, "Multi-video commenters: {}", self.multi_video_users)?;
        writeln!(f, "Fast commenters: {}", self.fast_commenters)?;
        writeln!(f, "New accounts with high activity: {}", self.low_follower_high_volume)?;
        writeln!(f)?;

        writeln!(f, "SUSPICIOUS COMMENT PATTERNS\n{rule}")?;
        writeln!(f, "Very short comments: {}", self.short_comments)?;
        writeln!(f, "Emoji short comments: {}", self.emoji_short_comments)?;
        writeln!(f, "Generic praise comments: {}", self.generic_praise_comments)?;
        writeln!(f, "Cross-video duplicates: {}", self.cross_video_duplicates)?;
        writeln!(f)?;

        writeln!(f, "HIGH RISK COMMENTS (Score >= {HIGH_RISK_THRESHOLD})\n{rule}")?;
        writeln!(
            f,
            "Total high risk comments: {} ({:.1}%)",
            self.high_risk_comments,
            pct(self.high_risk_comments, self.total_comments)
        )?;
        writeln!(f, "Unique high risk users: {}", self.high_risk_users)?;
        writeln!(f, "Average seeding score: {:.1}", self.mean_score)?;
        writeln!(f)?;

        writeln!(f, "TOP {TOP_USERS} MOST SUSPICIOUS USERS\n{rule}")?;
        for (i, u) in self.top_users.iter().enumerate() {
            writeln!(f, "{}. {} (Score: {:.1})", i + 1, u.user_unique_id, u.mean_score)?;
            writeln!(f, "   - Comments: {}", u.comment_count)?;
            writeln!(f, "   - Duplicate ratio: {:.2}", u.duplicate_ratio)?;
            writeln!(f, "   - Followers: {}", u.followers_count)?;
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Analyze the store's seeding dataset and write the report files into the store directory.
pub fn write_analysis(store: &OutputStore) -> Result<AnalysisReport> {
    let records = store.read_seeding()?;
    let (report, high_risk) = analyze(&records, Utc::now());

    let report_path = store.dir().join(REPORT_FILE);
    fs::write(&report_path, report.to_string())
        .with_context(|| format!("writing {}", report_path.display()))?;

    let csv_path = store.dir().join(HIGH_RISK_FILE);
    let mut wtr = csv::Writer::from_path(&csv_path)
        .with_context(|| format!("creating {}", csv_path.display()))?;
    for row in &high_risk {
        wtr.serialize(row)
            .with_context(|| format!("writing {}", csv_path.display()))?;
    }
    // headerless when there is nothing to export
    wtr.flush()
        .with_context(|| format!("flushing {}", csv_path.display()))?;

    tracing::info!(
        rows = report.total_comments,
        high_risk = report.high_risk_comments,
        report = %report_path.display(),
        "seeding analysis written"
    );
    Ok(report)
}

// ------------------------------------------------------------
// Status
// ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetStatus {
    pub video_ids: Vec<String>,
    pub main_comments: usize,
    pub reply_comments: usize,
    pub users: usize,
    pub verified_users: usize,
    pub seeding_rows: usize,
    /// `None` when no progress file exists yet.
    pub progress: Option<ProgressState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoStatus {
    pub video_id: String,
    pub description: String,
    pub view_count: u64,
    pub comment_count: u64,
}

pub fn dataset_status(store: &OutputStore, progress_path: &Path) -> Result<DatasetStatus> {
    let video_ids = video_rows(store)?
        .into_iter()
        .map(|v| v.video_id)
        .collect();
    let comments = store.read_comments()?;
    let reply_comments = comments.iter().filter(|c| c.is_reply).count();
    let users = store.read_users()?;
    let progress = progress_path
        .exists()
        .then(|| ProgressTracker::load(progress_path).state().clone());

    Ok(DatasetStatus {
        video_ids,
        main_comments: comments.len() - reply_comments,
        reply_comments,
        users: users.len(),
        verified_users: users.iter().filter(|u| u.verified).count(),
        seeding_rows: store.read_seeding()?.len(),
        progress,
    })
}

/// The persisted video row for `video_id`, if it was collected.
pub fn find_video(store: &OutputStore, video_id: &str) -> Result<Option<VideoStatus>> {
    Ok(video_rows(store)?
        .into_iter()
        .find(|v| v.video_id == video_id))
}

fn video_rows(store: &OutputStore) -> Result<Vec<VideoStatus>> {
    let path = store.videos_path();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut rdr =
        csv::Reader::from_path(&path).with_context(|| format!("opening {}", path.display()))?;
    let headers = rdr.headers()?.clone();
    let col = |name: &str| headers.iter().position(|h| h == name);
    let (Some(id), Some(desc), Some(views), Some(comments)) = (
        col("video_id"),
        col("description"),
        col("view_count"),
        col("comment_count"),
    ) else {
        anyhow::bail!("{} has an unexpected header", path.display());
    };

    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec.with_context(|| format!("reading {}", path.display()))?;
        let field = |i: usize| rec.get(i).unwrap_or_default();
        out.push(VideoStatus {
            video_id: field(id).to_string(),
            description: field(desc).to_string(),
            view_count: field(views).parse().unwrap_or(0),
            comment_count: field(comments).parse().unwrap_or(0),
        });
    }
    Ok(out)
}

fn preview(ids: &[String]) -> String {
    if ids.len() > 5 {
        format!("{:?}...", &ids[..5])
    } else {
        format!("{ids:?}")
    }
}

impl fmt::Display for DatasetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bar = "=".repeat(60);
        writeln!(f, "{bar}\nDATASET STATUS\n{bar}")?;
        writeln!(f, "\nVIDEOS:\n   Total videos crawled: {}", self.video_ids.len())?;
        if !self.video_ids.is_empty() {
            writeln!(f, "   Video IDs: {}", preview(&self.video_ids))?;
        }
        writeln!(
            f,
            "\nCOMMENTS:\n   Total comments: {}\n   Main comments: {}\n   Reply comments: {}",
            self.main_comments + self.reply_comments,
            self.main_comments,
            self.reply_comments
        )?;
        writeln!(
            f,
            "\nUSERS:\n   Total unique users: {}\n   Verified users: {}",
            self.users, self.verified_users
        )?;
        writeln!(f, "\nSEEDING DATASET:\n   Total records: {}", self.seeding_rows)?;
        if let Some(p) = &self.progress {
            writeln!(f, "\nPROGRESS:")?;
            writeln!(f, "   Processed video IDs: {}", preview(&p.processed_videos))?;
            writeln!(f, "   Total comments in progress: {}", p.total_comments)?;
            writeln!(f, "   Total users in progress: {}", p.total_users)?;
        }
        write!(f, "\n{bar}")
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let desc: String = self.description.chars().take(100).collect();
        writeln!(f, "Video {} has been crawled:", self.video_id)?;
        writeln!(f, "   Description: {desc}...")?;
        writeln!(f, "   Views: {}", self.view_count)?;
        write!(f, "   Comments: {}", self.comment_count)
    }
}
