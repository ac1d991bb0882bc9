//! Conversion of source records into the canonical `Session`.
//!
//! Both conversions are total: anything that cannot yield a session has
//! already been rejected by the parser or the feed.

use std::path::Path;

use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc};

use super::status::classify;
use super::types::{Provenance, Session, SessionStatus};
use crate::local::descriptor::{ConversationEntry, LocalDescriptor, Role};
use crate::local::question::{awaits_input, QuestionDetector};
use crate::remote::AgentTask;

/// Longest title derived from a conversation, in characters
pub const TITLE_MAX_CHARS: usize = 100;

/// Repository shown for local sessions that never recorded one
pub const LOCAL_REPOSITORY: &str = "local";

/// Branch shown for local sessions that never recorded one
pub const UNKNOWN_BRANCH: &str = "unknown";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Parse the timestamp spellings seen in descriptors and API payloads.
///
/// Naive times are taken as UTC. Placeholder "zero" times (year 1) mean
/// unknown and come back as `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
        .or_else(|| raw.parse::<i64>().ok().and_then(timestamp_from_epoch))?;

    if parsed.year() <= 1 {
        None
    } else {
        Some(parsed)
    }
}

/// Epoch seconds or milliseconds, told apart by magnitude
pub fn timestamp_from_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value <= 0 {
        return None;
    }
    if value > 100_000_000_000 {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}

/// Collapse whitespace and cut to `TITLE_MAX_CHARS`, marking the cut
pub fn truncate_title(text: &str) -> String {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.chars().count() <= TITLE_MAX_CHARS {
        text
    } else {
        let cut: String = text.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", cut)
    }
}

/// First non-empty user-authored message, used as a title fallback
fn first_user_prompt(conversation: &[ConversationEntry]) -> Option<String> {
    conversation
        .iter()
        .filter(|entry| entry.is_from(Role::User))
        .find_map(ConversationEntry::text)
        .map(truncate_title)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Convert a remote agent task. Fields map one to one; the status still goes
/// through the classifier so the closed status set holds.
pub fn from_remote(task: AgentTask, now: DateTime<Utc>) -> Session {
    let status = classify(task.status.as_deref().unwrap_or(""), task.updated_at, now);
    let title = non_empty(task.title).unwrap_or_else(|| Session::default_title(&task.id));
    Session {
        status,
        title,
        repository: task.repository.unwrap_or_default(),
        branch: task.branch.unwrap_or_default(),
        pr_url: non_empty(task.pr_url),
        pr_number: task.pr_number,
        created_at: task.created_at,
        updated_at: task.updated_at,
        source: Provenance::AgentTask,
        telemetry: None,
        id: task.id,
    }
}

/// Convert a parsed local descriptor.
///
/// A pending question overrides whatever status the file declares, so this
/// check runs before the classifier.
pub fn from_local(
    desc: LocalDescriptor,
    detector: &dyn QuestionDetector,
    now: DateTime<Utc>,
) -> Session {
    let last_seen = desc.last_seen();

    let status = if awaits_input(&desc, detector) {
        SessionStatus::NeedsInput
    } else {
        classify(desc.status.as_deref().unwrap_or(""), last_seen, now)
    };

    let title = non_empty(desc.title)
        .or_else(|| first_user_prompt(&desc.conversation))
        .unwrap_or_else(|| Session::default_title(&desc.session_id));

    let repository = non_empty(desc.repository)
        .or_else(|| {
            desc.cwd.as_deref().and_then(|cwd| {
                Path::new(cwd)
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
            })
        })
        .unwrap_or_else(|| LOCAL_REPOSITORY.to_string());

    Session {
        id: desc.session_id,
        status,
        title,
        repository,
        branch: non_empty(desc.branch).unwrap_or_else(|| UNKNOWN_BRANCH.to_string()),
        pr_url: None,
        pr_number: None,
        created_at: desc.created_at,
        updated_at: last_seen,
        source: Provenance::LocalCopilot,
        telemetry: None,
    }
}
