// src/model.rs
//! Record shapes: raw provider payloads on the way in, typed rows on the way out.
//!
//! Raw types mirror the scraping backend's JSON and are deliberately tolerant
//! (ids/timestamps may arrive as numbers or strings, most fields may be absent).
//! Output rows have a fixed column order; the `*_COLUMNS` constants are the
//! CSV headers and must stay in sync with the struct field order.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

// ------------------------------------------------------------
// Raw provider payloads
// ------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawVideoInfo {
    #[serde(deserialize_with = "lenient_string")]
    pub id: Option<String>,
    pub desc: String,
    #[serde(rename = "textExtra")]
    pub text_extra: Vec<RawTextExtra>,
    pub stats: RawVideoStats,
    pub author: RawAuthor,
    #[serde(rename = "createTime", deserialize_with = "lenient_opt_i64")]
    pub create_time: Option<i64>,
    pub music: RawMusic,
    #[serde(deserialize_with = "lenient_u64")]
    pub duration: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawTextExtra {
    #[serde(rename = "hashtagName")]
    pub hashtag_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawVideoStats {
    #[serde(rename = "playCount", deserialize_with = "lenient_u64")]
    pub play_count: u64,
    #[serde(rename = "diggCount", deserialize_with = "lenient_u64")]
    pub digg_count: u64,
    #[serde(rename = "shareCount", deserialize_with = "lenient_u64")]
    pub share_count: u64,
    #[serde(rename = "commentCount", deserialize_with = "lenient_u64")]
    pub comment_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAuthor {
    #[serde(deserialize_with = "lenient_string")]
    pub id: Option<String>,
    pub nickname: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawMusic {
    pub title: String,
}

/// One comment as yielded by the comment stream. Replies may be inlined.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawComment {
    #[serde(deserialize_with = "lenient_string")]
    pub cid: Option<String>,
    pub text: String,
    #[serde(deserialize_with = "lenient_u64")]
    pub digg_count: u64,
    #[serde(deserialize_with = "lenient_opt_i64")]
    pub create_time: Option<i64>,
    pub user: RawCommentUser,
    #[serde(deserialize_with = "lenient_u64")]
    pub reply_comment_total: u64,
    pub reply_comment: Option<Vec<RawComment>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCommentUser {
    #[serde(deserialize_with = "lenient_string")]
    pub uid: Option<String>,
    pub unique_id: String,
    pub nickname: String,
    pub sec_uid: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawUserInfo {
    #[serde(rename = "userInfo")]
    pub user_info: RawUserInfoBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawUserInfoBody {
    pub user: RawUser,
    pub stats: RawUserStats,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawUser {
    pub signature: String,
    pub verified: bool,
    #[serde(rename = "privateAccount")]
    pub private_account: bool,
    #[serde(rename = "avatarLarger")]
    pub avatar_larger: String,
    #[serde(rename = "createTime", deserialize_with = "lenient_opt_i64")]
    pub create_time: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawUserStats {
    #[serde(rename = "followerCount", deserialize_with = "lenient_u64")]
    pub follower_count: u64,
    #[serde(rename = "followingCount", deserialize_with = "lenient_u64")]
    pub following_count: u64,
    #[serde(rename = "heartCount", deserialize_with = "lenient_u64")]
    pub heart_count: u64,
    #[serde(rename = "videoCount", deserialize_with = "lenient_u64")]
    pub video_count: u64,
    #[serde(rename = "friendCount", deserialize_with = "lenient_u64")]
    pub friend_count: u64,
}

// ------------------------------------------------------------
// Externally fetched profile attributes
// ------------------------------------------------------------

/// Profile fields that only the external fetch can provide.
/// `Default` is the documented fallback when the fetch fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalProfile {
    pub followers_count: u64,
    pub following_count: u64,
    pub heart_count: u64,
    pub video_count: u64,
    pub friend_count: u64,
    pub bio_length: usize,
    pub verified: bool,
    pub private_account: bool,
    pub has_profile_picture: bool,
    pub account_age_days: i64,
}

impl ExternalProfile {
    pub fn from_raw(raw: &RawUserInfo, now: DateTime<Utc>) -> Self {
        let user = &raw.user_info.user;
        let stats = &raw.user_info.stats;
        let account_age_days = user
            .create_time
            .filter(|ts| *ts > 0)
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .map(|created| (now - created).num_days().max(0))
            .unwrap_or(0);

        Self {
            followers_count: stats.follower_count,
            following_count: stats.following_count,
            heart_count: stats.heart_count,
            video_count: stats.video_count,
            friend_count: stats.friend_count,
            bio_length: user.signature.chars().count(),
            verified: user.verified,
            private_account: user.private_account,
            has_profile_picture: !user.avatar_larger.is_empty(),
            account_age_days,
        }
    }
}

// ------------------------------------------------------------
// Output rows
// ------------------------------------------------------------

pub const VIDEO_COLUMNS: &[&str] = &[
    "video_id",
    "description",
    "hashtags",
    "view_count",
    "like_count",
    "share_count",
    "comment_count",
    "author_id",
    "author_nickname",
    "create_time",
    "video_link",
    "music_title",
    "duration",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoRecord {
    pub video_id: String,
    pub description: String,
    #[serde(serialize_with = "join_tags")]
    pub hashtags: Vec<String>,
    pub view_count: u64,
    pub like_count: u64,
    pub share_count: u64,
    pub comment_count: u64,
    pub author_id: String,
    pub author_nickname: String,
    #[serde(with = "ts_format")]
    pub create_time: DateTime<Utc>,
    pub video_link: String,
    pub music_title: String,
    pub duration: u64,
}

impl VideoRecord {
    /// Map provider fields; `None` when the provider gave no video id.
    pub fn from_raw(raw: &RawVideoInfo, source_url: &str) -> Option<Self> {
        let video_id = raw.id.clone().filter(|id| !id.trim().is_empty())?;
        let hashtags = raw
            .text_extra
            .iter()
            .filter_map(|t| t.hashtag_name.clone())
            .filter(|t| !t.is_empty())
            .collect();

        Some(Self {
            video_id,
            description: raw.desc.clone(),
            hashtags,
            view_count: raw.stats.play_count,
            like_count: raw.stats.digg_count,
            share_count: raw.stats.share_count,
            comment_count: raw.stats.comment_count,
            author_id: raw.author.id.clone().unwrap_or_default(),
            author_nickname: raw.author.nickname.clone(),
            create_time: unix_or_epoch(raw.create_time.unwrap_or(0)),
            video_link: source_url.to_string(),
            music_title: raw.music.title.clone(),
            duration: raw.duration,
        })
    }
}

pub const COMMENT_COLUMNS: &[&str] = &[
    "comment_id",
    "video_id",
    "comment_text",
    "like_count",
    "timestamp",
    "user_id",
    "user_unique_id",
    "reply_count",
    "comment_hash",
    "text_length",
    "has_emoji",
    "has_mention",
    "has_hashtag",
    "is_reply",
    "parent_comment_id",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub comment_id: String,
    pub video_id: String,
    pub comment_text: String,
    pub like_count: u64,
    #[serde(with = "ts_format")]
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub user_unique_id: String,
    pub reply_count: u64,
    pub comment_hash: String,
    pub text_length: usize,
    pub has_emoji: bool,
    pub has_mention: bool,
    pub has_hashtag: bool,
    pub is_reply: bool,
    pub parent_comment_id: Option<String>,
}

/// Statistics derived from a user's observations within the current run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserStats {
    pub comment_count: usize,
    pub unique_video_count: usize,
    pub duplicate_ratio: f64,
    pub avg_time_between_comments: f64,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Identity fields captured from the first comment a user posts on a video.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: String,
    pub user_unique_id: String,
    pub nickname: String,
}

pub const USER_COLUMNS: &[&str] = &[
    "user_id",
    "user_unique_id",
    "nickname",
    "followers_count",
    "following_count",
    "heart_count",
    "video_count",
    "comment_count",
    "unique_video_count",
    "duplicate_ratio",
    "avg_time_between_comments",
    "account_age_days",
    "has_profile_picture",
    "bio_length",
    "verified",
    "first_seen",
    "last_seen",
    "private_account",
    "friend_count",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub user_unique_id: String,
    pub nickname: String,
    pub followers_count: u64,
    pub following_count: u64,
    pub heart_count: u64,
    pub video_count: u64,
    pub comment_count: usize,
    pub unique_video_count: usize,
    pub duplicate_ratio: f64,
    pub avg_time_between_comments: f64,
    pub account_age_days: i64,
    pub has_profile_picture: bool,
    pub bio_length: usize,
    pub verified: bool,
    #[serde(with = "ts_format::option")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(with = "ts_format::option")]
    pub last_seen: Option<DateTime<Utc>>,
    pub private_account: bool,
    pub friend_count: u64,
}

impl UserProfile {
    pub fn assemble(identity: &UserIdentity, stats: &UserStats, ext: &ExternalProfile) -> Self {
        Self {
            user_id: identity.user_id.clone(),
            user_unique_id: identity.user_unique_id.clone(),
            nickname: identity.nickname.clone(),
            followers_count: ext.followers_count,
            following_count: ext.following_count,
            heart_count: ext.heart_count,
            video_count: ext.video_count,
            comment_count: stats.comment_count,
            unique_video_count: stats.unique_video_count,
            duplicate_ratio: stats.duplicate_ratio,
            avg_time_between_comments: stats.avg_time_between_comments,
            account_age_days: ext.account_age_days,
            has_profile_picture: ext.has_profile_picture,
            bio_length: ext.bio_length,
            verified: ext.verified,
            first_seen: stats.first_seen,
            last_seen: stats.last_seen,
            private_account: ext.private_account,
            friend_count: ext.friend_count,
        }
    }
}

pub const SEEDING_COLUMNS: &[&str] = &[
    "video_id",
    "video_description",
    "video_hashtags",
    "video_view_count",
    "video_like_count",
    "video_share_count",
    "video_comment_count",
    "video_author_id",
    "video_author_nickname",
    "video_create_time",
    "comment_id",
    "comment_text",
    "comment_like_count",
    "comment_timestamp",
    "comment_reply_count",
    "comment_hash",
    "text_length",
    "has_emoji",
    "has_mention",
    "has_hashtag",
    "is_reply",
    "user_id",
    "user_unique_id",
    "user_nickname",
    "user_followers_count",
    "user_following_count",
    "user_video_count",
    "user_verified",
    "user_comment_count_in_dataset",
    "user_duplicate_ratio",
    "user_avg_time_between_comments",
    "user_unique_video_count",
];

/// One comment joined with its video and its author's finalized profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedingRecord {
    pub video_id: String,
    pub video_description: String,
    pub video_hashtags: String,
    pub video_view_count: u64,
    pub video_like_count: u64,
    pub video_share_count: u64,
    pub video_comment_count: u64,
    pub video_author_id: String,
    pub video_author_nickname: String,
    #[serde(with = "ts_format")]
    pub video_create_time: DateTime<Utc>,
    pub comment_id: String,
    pub comment_text: String,
    pub comment_like_count: u64,
    #[serde(with = "ts_format")]
    pub comment_timestamp: DateTime<Utc>,
    pub comment_reply_count: u64,
    pub comment_hash: String,
    pub text_length: usize,
    pub has_emoji: bool,
    pub has_mention: bool,
    pub has_hashtag: bool,
    pub is_reply: bool,
    pub user_id: String,
    pub user_unique_id: String,
    pub user_nickname: String,
    pub user_followers_count: u64,
    pub user_following_count: u64,
    pub user_video_count: u64,
    pub user_verified: bool,
    pub user_comment_count_in_dataset: usize,
    pub user_duplicate_ratio: f64,
    pub user_avg_time_between_comments: f64,
    pub user_unique_video_count: usize,
}

impl SeedingRecord {
    /// Denormalize. Without a profile (anonymous author) user fields stay at defaults.
    pub fn join(video: &VideoRecord, comment: &CommentRecord, user: Option<&UserProfile>) -> Self {
        let fallback;
        let user = match user {
            Some(u) => u,
            None => {
                fallback = UserProfile::assemble(
                    &UserIdentity::default(),
                    &UserStats::default(),
                    &ExternalProfile::default(),
                );
                &fallback
            }
        };

        Self {
            video_id: video.video_id.clone(),
            video_description: video.description.clone(),
            video_hashtags: video.hashtags.join(","),
            video_view_count: video.view_count,
            video_like_count: video.like_count,
            video_share_count: video.share_count,
            video_comment_count: video.comment_count,
            video_author_id: video.author_id.clone(),
            video_author_nickname: video.author_nickname.clone(),
            video_create_time: video.create_time,
            comment_id: comment.comment_id.clone(),
            comment_text: comment.comment_text.clone(),
            comment_like_count: comment.like_count,
            comment_timestamp: comment.timestamp,
            comment_reply_count: comment.reply_count,
            comment_hash: comment.comment_hash.clone(),
            text_length: comment.text_length,
            has_emoji: comment.has_emoji,
            has_mention: comment.has_mention,
            has_hashtag: comment.has_hashtag,
            is_reply: comment.is_reply,
            user_id: user.user_id.clone(),
            user_unique_id: user.user_unique_id.clone(),
            user_nickname: user.nickname.clone(),
            user_followers_count: user.followers_count,
            user_following_count: user.following_count,
            user_video_count: user.video_count,
            user_verified: user.verified,
            user_comment_count_in_dataset: user.comment_count,
            user_duplicate_ratio: user.duplicate_ratio,
            user_avg_time_between_comments: user.avg_time_between_comments,
            user_unique_video_count: user.unique_video_count,
        }
    }
}

// ------------------------------------------------------------
// serde helpers
// ------------------------------------------------------------

pub fn unix_or_epoch(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_default()
}

/// `%Y-%m-%d %H:%M:%S` in UTC, the timestamp format of every output file.
pub mod ts_format {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&dt.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(s.trim(), FORMAT)
            .map(|n| n.and_utc())
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::FORMAT;
        use chrono::{DateTime, NaiveDateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            dt: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match dt {
                Some(dt) => s.collect_str(&dt.format(FORMAT)),
                None => s.serialize_str(""),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let s = Option::<String>::deserialize(d)?.unwrap_or_default();
            if s.trim().is_empty() {
                return Ok(None);
            }
            NaiveDateTime::parse_from_str(s.trim(), FORMAT)
                .map(|n| Some(n.and_utc()))
                .map_err(serde::de::Error::custom)
        }
    }
}

#[allow(clippy::ptr_arg)]
fn join_tags<S: Serializer>(tags: &Vec<String>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&tags.join(","))
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(lenient_opt_i64(d)?
        .and_then(|v| u64::try_from(v).ok())
        .unwrap_or(0))
}
