//! Bulletin validation.
//!
//! Sender, subject and `join` usernames are trimmed and must be non-empty.
//! A missing or unparseable `postDate` is replaced by server time instead of
//! failing the post.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::debug;

use crate::bulletin::{PostDate, PostPayload, ValidatedBulletin};
use crate::errors::ValidationError;

/// Maximum subject length in characters.
pub const MAX_SUBJECT_LENGTH: usize = 500;

/// Naive layouts accepted in addition to RFC 3339, read as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];

/// Validate a raw post, using the current time as the fallback post date.
pub fn validate(payload: &PostPayload) -> Result<ValidatedBulletin, ValidationError> {
    validate_at(payload, Utc::now())
}

/// Validate a raw post with an explicit fallback timestamp.
pub fn validate_at(
    payload: &PostPayload,
    now: DateTime<Utc>,
) -> Result<ValidatedBulletin, ValidationError> {
    let sender = payload.sender.as_deref().unwrap_or_default().trim();
    if sender.is_empty() {
        return Err(ValidationError::EmptySender);
    }

    let subject = payload.subject.as_deref().unwrap_or_default().trim();
    if subject.is_empty() {
        return Err(ValidationError::EmptySubject);
    }
    let subject_len = subject.chars().count();
    if subject_len > MAX_SUBJECT_LENGTH {
        return Err(ValidationError::SubjectTooLong {
            len: subject_len,
            max: MAX_SUBJECT_LENGTH,
        });
    }

    let post_date = match payload.post_date.as_deref().and_then(parse_post_date) {
        Some(date) => date,
        None => {
            debug!(raw = ?payload.post_date, "post date missing or unparseable, using server time");
            PostDate::from(now)
        }
    };

    Ok(ValidatedBulletin {
        sender: sender.to_owned(),
        post_date,
        subject: subject.to_owned(),
    })
}

/// Check a `join` username: trimmed and non-empty, no length bound.
pub fn validate_username(raw: Option<&str>) -> Result<String, ValidationError> {
    let username = raw.unwrap_or_default().trim();
    if username.is_empty() {
        return Err(ValidationError::EmptyUsername);
    }
    Ok(username.to_owned())
}

/// Parse a client timestamp into UTC.
///
/// Accepts RFC 3339 with any offset, plus the naive layouts in `NAIVE_FORMATS`.
pub fn parse_post_date(raw: &str) -> Option<PostDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(date) = PostDate::parse_rfc3339(raw) {
        return Some(date);
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| PostDate::from(Utc.from_utc_datetime(&naive)))
}
