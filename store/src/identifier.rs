use chrono::{DateTime, TimeZone};
use std::fmt;

/// Longest sanitized title kept in a conversation id.
pub const MAX_TITLE_LEN: usize = 50;

/// Base used when nothing of the title survives sanitizing.
pub const FALLBACK_BASE: &str = "conversation";

/// Suffix appended to every id, second granularity.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Derive a directory-safe conversation id from a title and an instant.
///
/// Keeps alphanumerics, spaces, hyphens and underscores, turns spaces into
/// hyphens, lowercases, caps the result at [`MAX_TITLE_LEN`] characters and
/// appends `-YYYYMMDD-HHMMSS` rendered in `now`'s own timezone. Two calls with
/// the same title inside the same second produce the same id.
pub fn generate_conversation_id<Tz>(title: &str, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let timestamp = now.format(TIMESTAMP_FORMAT);
    let base = sanitize_title(title);
    if base.is_empty() {
        format!("{}-{}", FALLBACK_BASE, timestamp)
    } else {
        format!("{}-{}", base, timestamp)
    }
}

fn sanitize_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let sanitized = kept.trim().replace(' ', "-").to_lowercase();

    if sanitized.chars().count() > MAX_TITLE_LEN {
        let truncated: String = sanitized.chars().take(MAX_TITLE_LEN).collect();
        truncated.trim_end_matches('-').to_string()
    } else {
        sanitized
    }
}
