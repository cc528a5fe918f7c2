//! Rule-based seeding score for one joined record.
//!
//! Each rule adds fixed points when its predicate holds; the sum is capped at 100.
//! Rules are independent, so evaluation order never changes the result.
//!
//! | rule                  | condition                                          | points |
//! |-----------------------|----------------------------------------------------|--------|
//! | duplicate_text        | user duplicate ratio > 0.5                         | 20     |
//! | low_follower_volume   | > 10 comments in dataset and < 100 followers       | 15     |
//! | fast_commenter        | >= 2 comments and mean gap < 60 s                  | 15     |
//! | short_text            | text length < 20                                   | 10     |
//! | emoji_short_text      | has emoji and text length < 10                     | 10     |
//! | no_mention_or_hashtag | neither `@` nor `#`                                | 5      |
//! | multi_video           | active on > 5 distinct videos                      | 10     |

use crate::model::SeedingRecord;

pub const MAX_SCORE: u32 = 100;

/// Scores at or above this count as high risk in reports.
pub const HIGH_RISK_THRESHOLD: u8 = 50;

pub struct Rule {
    pub name: &'static str,
    pub points: u32,
    pub test: fn(&SeedingRecord) -> bool,
}

pub const RULES: &[Rule] = &[
    Rule {
        name: "duplicate_text",
        points: 20,
        test: |r| r.user_duplicate_ratio > 0.5,
    },
    Rule {
        name: "low_follower_volume",
        points: 15,
        test: |r| r.user_comment_count_in_dataset > 10 && r.user_followers_count < 100,
    },
    Rule {
        name: "fast_commenter",
        points: 15,
        test: |r| r.user_avg_time_between_comments < 60.0,
    },
    Rule {
        name: "short_text",
        points: 10,
        test: |r| r.text_length < 20,
    },
    Rule {
        name: "emoji_short_text",
        points: 10,
        test: |r| r.has_emoji && r.text_length < 10,
    },
    Rule {
        name: "no_mention_or_hashtag",
        points: 5,
        test: |r| !r.has_mention && !r.has_hashtag,
    },
    Rule {
        name: "multi_video",
        points: 10,
        test: |r| r.user_unique_video_count > 5,
    },
];

/// Score plus the names of the rules that fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub score: u8,
    pub reasons: Vec<&'static str>,
}

pub fn score(rec: &SeedingRecord) -> u8 {
    explain(rec).score
}

pub fn explain(rec: &SeedingRecord) -> ScoreBreakdown {
    let mut total = 0u32;
    let mut reasons = Vec::new();
    for rule in RULES {
        if (rule.test)(rec) {
            total += rule.points;
            reasons.push(rule.name);
        }
    }
    ScoreBreakdown {
        score: total.min(MAX_SCORE) as u8,
        reasons,
    }
}
