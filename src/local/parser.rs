//! Tolerant parsing of local workspace descriptors.
//!
//! Two parsers share one capability and are tried in order: the structured
//! YAML parser, then a line scanner that recovers the handful of scalar
//! fields needed to place a session even when the document is broken.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::descriptor::{parse_flag, LocalDescriptor, RawDescriptor};
use super::question::QuestionDetector;
use crate::error::ParseError;
use crate::session::normalize::{from_local, parse_timestamp};
use crate::session::Session;

/// Turns descriptor text into a `LocalDescriptor`
pub trait DescriptorParser {
    fn parse(&self, text: &str) -> Result<LocalDescriptor, ParseError>;
}

/// Full YAML parse with lenient field typing
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredParser;

impl DescriptorParser for StructuredParser {
    fn parse(&self, text: &str) -> Result<LocalDescriptor, ParseError> {
        let raw: RawDescriptor =
            serde_yaml::from_str(text).map_err(|e| ParseError::Structure(e.to_string()))?;
        raw.into_descriptor().ok_or(ParseError::MissingSessionId)
    }
}

/// Best-effort `key: value` scan used once the structured parse has failed
#[derive(Debug, Clone, Copy, Default)]
pub struct LineScanParser;

impl LineScanParser {
    fn apply(desc: &mut LocalDescriptor, id: &mut Option<String>, key: &str, value: String) {
        match key {
            "session_id" | "id" => {
                id.get_or_insert(value);
            }
            "title" => {
                desc.title.get_or_insert(value);
            }
            "repository" => {
                desc.repository.get_or_insert(value);
            }
            "branch" => {
                desc.branch.get_or_insert(value);
            }
            "status" => {
                desc.status.get_or_insert(value);
            }
            "last_activity" => {
                if desc.last_activity.is_none() {
                    desc.last_activity = parse_timestamp(&value);
                }
            }
            "awaiting_user_input" => {
                if let Some(flag) = parse_flag(&value) {
                    desc.awaiting_user_input |= flag;
                }
            }
            _ => {}
        }
    }
}

impl DescriptorParser for LineScanParser {
    fn parse(&self, text: &str) -> Result<LocalDescriptor, ParseError> {
        let mut desc = LocalDescriptor {
            recovered: true,
            ..Default::default()
        };
        let mut id: Option<String> = None;

        for line in text.lines() {
            // Nested keys belong to history entries, not the session
            if line.starts_with(|c: char| c.is_whitespace() || c == '-') {
                continue;
            }
            let Some((key, value)) = split_field(line) else {
                continue;
            };
            Self::apply(&mut desc, &mut id, key, value);
        }

        desc.session_id = id.ok_or(ParseError::MissingSessionId)?;
        Ok(desc)
    }
}

/// Split `key: value`, trimming quotes and trailing comments from the value.
/// Returns `None` for blank values and lines that are not fields.
fn split_field(line: &str) -> Option<(&str, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let (key, value) = trimmed.split_once(':')?;
    let key = key.trim().trim_matches(|c: char| c == '"' || c == '\'');
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }

    let mut value = value.trim();
    if let Some(quote) = value.chars().next().filter(|c| *c == '"' || *c == '\'') {
        value = value[1..].split(quote).next().unwrap_or_default();
    } else if let Some((before, _)) = value.split_once(" #") {
        value = before.trim_end();
    }

    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some((key, value.to_string()))
    }
}

/// Parse descriptor bytes, falling back to the line scan only when the
/// structured parse fails.
pub fn parse_descriptor(raw: &[u8]) -> Result<LocalDescriptor, ParseError> {
    let text = String::from_utf8_lossy(raw);
    StructuredParser.parse(&text).or_else(|err| {
        debug!(error = %err, "structured descriptor parse failed, scanning lines");
        LineScanParser.parse(&text)
    })
}

/// Parse and normalize one descriptor into a `Session`
pub fn parse_session(
    raw: &[u8],
    detector: &dyn QuestionDetector,
    now: DateTime<Utc>,
) -> Result<Session, ParseError> {
    parse_descriptor(raw).map(|desc| from_local(desc, detector, now))
}
