//! Status classification.
//!
//! Maps whatever a source calls its state onto the closed `SessionStatus`
//! set. Explicit synonyms always win; time-based inference only applies to
//! strings nothing recognizes.

use chrono::{DateTime, Duration, Utc};

use super::types::SessionStatus;

/// Idle time after which an unexplained session is assumed finished
pub const STALE_AFTER_HOURS: i64 = 24;

const COMPLETED: &[&str] = &["completed", "finished", "done", "merged", "closed"];
const RUNNING: &[&str] = &["running", "in progress", "active", "open"];
const FAILED: &[&str] = &["failed", "error", "cancelled", "canceled"];
const QUEUED: &[&str] = &["queued", "pending", "waiting"];
const NEEDS_INPUT: &[&str] = &["needs input"];

/// Lowercase, trim, and treat `_`/`-` as word separators so `in_progress`
/// and `needs-input` land on the same spelling as the synonym tables.
pub(crate) fn canonical(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Match a raw status against the synonym groups only
pub fn match_synonym(raw: &str) -> Option<SessionStatus> {
    let key = canonical(raw);
    let groups: [(&[&str], SessionStatus); 5] = [
        (COMPLETED, SessionStatus::Completed),
        (RUNNING, SessionStatus::Running),
        (FAILED, SessionStatus::Failed),
        (QUEUED, SessionStatus::Queued),
        (NEEDS_INPUT, SessionStatus::NeedsInput),
    ];
    groups
        .into_iter()
        .find(|(words, _)| words.contains(&key.as_str()))
        .map(|(_, status)| status)
}

/// Classify a raw status string given the last time the session did anything.
pub fn classify(
    raw: &str,
    last_activity: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> SessionStatus {
    if let Some(status) = match_synonym(raw) {
        return status;
    }

    let Some(last_activity) = last_activity else {
        return SessionStatus::Unknown;
    };

    if now.signed_duration_since(last_activity) > Duration::hours(STALE_AFTER_HOURS) {
        SessionStatus::Completed
    } else {
        SessionStatus::Running
    }
}
