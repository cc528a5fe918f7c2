//! # User aggregator
//! Per-run record of every accepted comment, keyed by author.
//!
//! Observations are appended as comments are accepted; statistics are
//! recomputed from the full list on demand. The only removal is `truncate`,
//! used to take back the tail of a video that never reached the outputs.
//! Nothing here is persisted, so each run starts from an empty map.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::model::UserStats;
use crate::text::content_hash;

/// One accepted comment, as far as user statistics are concerned.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub video_id: String,
}

#[derive(Debug, Default)]
pub struct UserAggregator {
    by_user: HashMap<String, Vec<Observation>>,
}

impl UserAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observation for `user_id`.
    pub fn record(&mut self, user_id: &str, obs: Observation) {
        self.by_user.entry(user_id.to_string()).or_default().push(obs);
    }

    /// Observations currently held for `user_id`.
    pub fn observations_of(&self, user_id: &str) -> usize {
        self.by_user.get(user_id).map_or(0, Vec::len)
    }

    /// Keep only the first `len` observations of `user_id`; a user left with
    /// none is forgotten entirely.
    pub fn truncate(&mut self, user_id: &str, len: usize) {
        if len == 0 {
            self.by_user.remove(user_id);
        } else if let Some(obs) = self.by_user.get_mut(user_id) {
            obs.truncate(len);
        }
    }

    /// Statistics over everything `user_id` posted so far in this run.
    /// Unknown users get `UserStats::default()`.
    pub fn compute_stats(&self, user_id: &str) -> UserStats {
        let Some(obs) = self.by_user.get(user_id).filter(|v| !v.is_empty()) else {
            return UserStats::default();
        };
        let n = obs.len();

        let distinct_hashes: HashSet<String> = obs.iter().map(|o| content_hash(&o.text)).collect();
        let duplicate_ratio = 1.0 - distinct_hashes.len() as f64 / n as f64;

        // stable sort: equal timestamps keep insertion order
        let mut timestamps: Vec<DateTime<Utc>> = obs.iter().map(|o| o.timestamp).collect();
        timestamps.sort();

        let avg_time_between_comments = if n > 1 {
            let total: f64 = timestamps
                .windows(2)
                .map(|w| (w[1] - w[0]).num_milliseconds() as f64 / 1_000.0)
                .sum();
            total / (n - 1) as f64
        } else {
            0.0
        };

        let unique_video_count = obs
            .iter()
            .map(|o| o.video_id.as_str())
            .collect::<HashSet<_>>()
            .len();

        UserStats {
            comment_count: n,
            unique_video_count,
            duplicate_ratio: duplicate_ratio.clamp(0.0, 1.0),
            avg_time_between_comments,
            first_seen: timestamps.first().copied(),
            last_seen: timestamps.last().copied(),
        }
    }

    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }

    pub fn observation_count(&self) -> usize {
        self.by_user.values().map(Vec::len).sum()
    }
}
