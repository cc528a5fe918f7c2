//! Text features for comment filtering and spam signals.
//!
//! Everything here is pure: same input, same output, no I/O.
//! - `detect_language` gates which comments enter the pipeline at all.
//! - `extract_features` computes the cheap lexical signals stored per comment.
//! - `content_hash` is the duplicate key used by the per-user statistics.

use once_cell::sync::OnceCell;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Letters carrying Vietnamese diacritics (lowercase; input is lowercased first).
const DIACRITICS: &str = "àáạảãâầấậẩẫăằắặẳẵèéẹẻẽêềếệễểìíịỉĩòóọỏõôồốộổỗơờớợởỡùúụủũưừứựửữỳýỵỷỹđ";

/// Frequent function words; two distinct hits are enough to accept a comment.
const STOP_WORDS: &[&str] = &[
    "và", "của", "có", "được", "không", "với", "này", "cho", "từ", "để", "đã", "sẽ", "rất",
    "nhiều", "cũng", "một", "hai", "ba",
];

const MIN_STOP_WORD_HITS: usize = 2;

/// Emoji blocks: emoticons, misc symbols & pictographs, transport & map, regional indicators.
const EMOJI_RANGES: &[(u32, u32)] = &[
    (0x1F600, 0x1F64F),
    (0x1F300, 0x1F5FF),
    (0x1F680, 0x1F6FF),
    (0x1F1E0, 0x1F1FF),
];

/// Lexical features stored alongside every accepted comment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextFeatures {
    /// Length in characters (Unicode scalar values), not bytes.
    pub text_length: usize,
    pub has_emoji: bool,
    pub has_mention: bool,
    pub has_hashtag: bool,
}

pub fn extract_features(text: &str) -> TextFeatures {
    TextFeatures {
        text_length: text.chars().count(),
        has_emoji: text.chars().any(is_emoji),
        has_mention: text.contains('@'),
        has_hashtag: text.contains('#'),
    }
}

/// Returns `true` when the text looks like the target language: at least one
/// diacritic letter, or at least two distinct stop words as whole tokens.
pub fn detect_language(text: &str) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    let lower = text.to_lowercase();
    if lower.chars().any(|c| DIACRITICS.contains(c)) {
        return true;
    }

    let hits: HashSet<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|tok| STOP_WORDS.contains(tok))
        .collect();
    hits.len() >= MIN_STOP_WORD_HITS
}

/// Normalize text for duplicate detection: lowercase, collapse whitespace, trim.
pub fn normalize_text(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
    re_ws.replace_all(s.trim(), " ").to_lowercase()
}

/// Stable hex digest of the normalized text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(text).as_bytes());
    format!("{:x}", hasher.finalize())
}

fn is_emoji(c: char) -> bool {
    let cp = c as u32;
    EMOJI_RANGES
        .iter()
        .any(|&(lo, hi)| (lo..=hi).contains(&cp))
}
