//! Typed view of a local workspace descriptor.
//!
//! Descriptors are written by several CLI versions and are frequently hand
//! edited, so every field is optional and wrong-typed values degrade to
//! `None` instead of failing the whole document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;

use crate::session::normalize::{parse_timestamp, timestamp_from_epoch};

/// Who authored a conversation entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    Other,
}

impl Role {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "user" | "human" => Self::User,
            "assistant" | "agent" | "copilot" => Self::Assistant,
            _ => Self::Other,
        }
    }
}

/// One message from `conversation_history`
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationEntry {
    pub role: Option<Role>,
    pub content: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ConversationEntry {
    pub fn is_from(&self, role: Role) -> bool {
        self.role == Some(role)
    }

    /// Content with surrounding whitespace removed, `None` when blank
    pub fn text(&self) -> Option<&str> {
        self.content
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// A local descriptor after parsing, before normalization.
///
/// Produced by both the structured parser and the line-scan fallback; the
/// fallback can only fill the scalar fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocalDescriptor {
    pub session_id: String,
    pub title: Option<String>,
    pub repository: Option<String>,
    pub branch: Option<String>,
    /// Working directory the session was started in
    pub cwd: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    pub awaiting_user_input: bool,
    pub conversation: Vec<ConversationEntry>,
    /// Set when the document only survived through the line-scan fallback
    pub recovered: bool,
}

impl LocalDescriptor {
    /// Most recent known activity: explicit field first, then the newest
    /// timestamped message.
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_activity
            .or_else(|| self.conversation.iter().filter_map(|e| e.timestamp).max())
    }
}

/// Raw document shape accepted by the structured parser
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawDescriptor {
    #[serde(default, deserialize_with = "lenient_string")]
    session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    last_activity: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_string")]
    status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    repository: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    branch: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    summary: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    cwd: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    git_root: Option<String>,
    #[serde(default, deserialize_with = "lenient_history")]
    conversation_history: Vec<ConversationEntry>,
    #[serde(default, deserialize_with = "lenient_bool")]
    awaiting_user_input: Option<bool>,
}

impl RawDescriptor {
    /// `None` when the document carries no usable identifier
    pub(crate) fn into_descriptor(self) -> Option<LocalDescriptor> {
        let session_id = self.session_id.or(self.id)?;
        Some(LocalDescriptor {
            session_id,
            title: self.title.or(self.summary),
            repository: self.repository,
            branch: self.branch,
            cwd: self.cwd.or(self.git_root),
            status: self.status,
            created_at: self.start_time.or(self.created_at),
            last_activity: self.last_activity.or(self.updated_at),
            awaiting_user_input: self.awaiting_user_input.unwrap_or(false),
            conversation: self.conversation_history,
            recovered: false,
        })
    }
}

/// Scalar to non-empty string; anything else is ignored
pub(crate) fn scalar_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Tagged(tagged) => return scalar_string(&tagged.value),
        _ => return None,
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

pub(crate) fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "on" | "1" => Some(true),
        "false" | "no" | "n" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn value_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n.as_i64().and_then(timestamp_from_epoch),
        Value::Tagged(tagged) => value_timestamp(&tagged.value),
        _ => None,
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_string))
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => n.as_i64().map(|n| n != 0),
        Some(Value::String(s)) => parse_flag(&s),
        _ => None,
    })
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_timestamp))
}

fn lenient_history<'de, D>(deserializer: D) -> Result<Vec<ConversationEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let Some(Value::Sequence(items)) = value else {
        return Ok(Vec::new());
    };
    Ok(items.iter().filter_map(conversation_entry).collect())
}

fn conversation_entry(value: &Value) -> Option<ConversationEntry> {
    let Value::Mapping(map) = value else {
        return None;
    };
    let role = map
        .get("role")
        .and_then(scalar_string)
        .map(|r| Role::parse(&r));
    let content = map.get("content").and_then(content_text);
    let timestamp = map.get("timestamp").and_then(value_timestamp);
    Some(ConversationEntry {
        role,
        content,
        timestamp,
    })
}

/// Message content is either a string or a list of parts; text parts are
/// joined, other parts (tool calls, images) are dropped.
fn content_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Sequence(parts) => {
            let texts: Vec<String> = parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(s) => Some(s.clone()),
                    Value::Mapping(map) => map.get("text").and_then(scalar_string),
                    _ => None,
                })
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            }
        }
        _ => None,
    }
}
