//! Append-only CSV outputs: videos, comments, users and the joined seeding dataset.
//!
//! Headers are written once, when a file is first created (or found empty).
//! A video's rows are appended in one synchronous call with no await point,
//! so dropping the surrounding future can never leave half a video on disk.
//! The video row goes last: a row in the videos file implies the other three
//! files already hold that video's data. If any append fails, every file is
//! cut back to its length from before the batch.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};

use crate::model::{
    CommentRecord, SeedingRecord, UserProfile, VideoRecord, COMMENT_COLUMNS, SEEDING_COLUMNS,
    USER_COLUMNS, VIDEO_COLUMNS,
};

pub const VIDEOS_FILE: &str = "tiktok_videos.csv";
pub const COMMENTS_FILE: &str = "tiktok_comments.csv";
pub const USERS_FILE: &str = "tiktok_users.csv";
pub const SEEDING_FILE: &str = "tiktok_seeding_dataset.csv";

/// Everything one finished video contributes to the outputs.
#[derive(Debug, Clone, Copy)]
pub struct VideoBatch<'a> {
    pub video: &'a VideoRecord,
    pub comments: &'a [CommentRecord],
    pub users: &'a [UserProfile],
    pub seeding: &'a [SeedingRecord],
}

#[derive(Debug, Clone)]
pub struct OutputStore {
    dir: PathBuf,
}

impl OutputStore {
    /// Create the output directory and any missing headers.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating output dir {}", dir.display()))?;
        let store = Self {
            dir: dir.to_path_buf(),
        };
        init_file(&store.videos_path(), VIDEO_COLUMNS)?;
        init_file(&store.comments_path(), COMMENT_COLUMNS)?;
        init_file(&store.users_path(), USER_COLUMNS)?;
        init_file(&store.seeding_path(), SEEDING_COLUMNS)?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn videos_path(&self) -> PathBuf {
        self.dir.join(VIDEOS_FILE)
    }

    pub fn comments_path(&self) -> PathBuf {
        self.dir.join(COMMENTS_FILE)
    }

    pub fn users_path(&self) -> PathBuf {
        self.dir.join(USERS_FILE)
    }

    pub fn seeding_path(&self) -> PathBuf {
        self.dir.join(SEEDING_FILE)
    }

    pub fn write_video_batch(&self, batch: &VideoBatch<'_>) -> Result<()> {
        let paths = [
            self.seeding_path(),
            self.comments_path(),
            self.users_path(),
            self.videos_path(),
        ];
        let marks: Vec<Option<u64>> = paths
            .iter()
            .map(|p| fs::metadata(p).ok().filter(|m| m.is_file()).map(|m| m.len()))
            .collect();

        let res = append_rows(&paths[0], batch.seeding)
            .and_then(|()| append_rows(&paths[1], batch.comments))
            .and_then(|()| append_rows(&paths[2], batch.users))
            .and_then(|()| append_rows(&paths[3], std::slice::from_ref(batch.video)));

        if res.is_err() {
            for (path, mark) in paths.iter().zip(&marks) {
                let Some(len) = *mark else { continue };
                let cut = OpenOptions::new().write(true).open(path).and_then(|f| f.set_len(len));
                if let Err(e) = cut {
                    tracing::warn!(path = %path.display(), error = %e, "could not roll back partial batch");
                }
            }
        }
        res.with_context(|| format!("writing rows of video {}", batch.video.video_id))
    }

    /// Video ids present in the videos file.
    pub fn persisted_video_ids(&self) -> Result<HashSet<String>> {
        let path = self.videos_path();
        if !path.exists() {
            return Ok(HashSet::new());
        }
        let mut rdr = csv::Reader::from_path(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        let Some(idx) = rdr.headers()?.iter().position(|h| h == "video_id") else {
            return Ok(HashSet::new());
        };
        let mut ids = HashSet::new();
        for rec in rdr.records() {
            let rec = rec.with_context(|| format!("reading {}", path.display()))?;
            if let Some(id) = rec.get(idx).filter(|id| !id.is_empty()) {
                ids.insert(id.to_string());
            }
        }
        Ok(ids)
    }

    /// Recompute `(comment rows, distinct authors)` for one video from the comments file.
    pub fn recount(&self, video_id: &str) -> Result<(u64, u64)> {
        let comments: Vec<CommentRecord> = read_rows(&self.comments_path())?;
        let mut rows = 0u64;
        let mut authors = HashSet::new();
        for c in comments.iter().filter(|c| c.video_id == video_id) {
            rows += 1;
            if !c.user_unique_id.is_empty() {
                authors.insert(c.user_unique_id.as_str());
            }
        }
        Ok((rows, authors.len() as u64))
    }

    pub fn read_comments(&self) -> Result<Vec<CommentRecord>> {
        read_rows(&self.comments_path())
    }

    pub fn read_users(&self) -> Result<Vec<UserProfile>> {
        read_rows(&self.users_path())
    }

    pub fn read_seeding(&self) -> Result<Vec<SeedingRecord>> {
        read_rows(&self.seeding_path())
    }
}

fn init_file(path: &Path, columns: &[&str]) -> Result<()> {
    let empty = match fs::metadata(path) {
        Ok(m) => m.len() == 0,
        Err(_) => true,
    };
    if !empty {
        return Ok(());
    }
    let mut wtr =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    wtr.write_record(columns)?;
    wtr.flush()
        .with_context(|| format!("writing header of {}", path.display()))?;
    tracing::info!(path = %path.display(), "initialized csv");
    Ok(())
}

fn append_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let file = OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("opening {} for append", path.display()))?;
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    for row in rows {
        wtr.serialize(row)
            .with_context(|| format!("serializing row into {}", path.display()))?;
    }
    wtr.flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}

pub(crate) fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut rdr =
        csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    rdr.deserialize()
        .map(|r| r.with_context(|| format!("parsing row of {}", path.display())))
        .collect()
}
