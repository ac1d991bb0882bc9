use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::canonical;

/// Normalized lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Completed,
    Running,
    /// Blocked waiting for a human response
    NeedsInput,
    Failed,
    Queued,
    #[default]
    Unknown,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 6] = [
        Self::Completed,
        Self::Running,
        Self::NeedsInput,
        Self::Failed,
        Self::Queued,
        Self::Unknown,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Running => "running",
            Self::NeedsInput => "needs-input",
            Self::Failed => "failed",
            Self::Queued => "queued",
            Self::Unknown => "unknown",
        }
    }

    /// Running, queued, or waiting on the user
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Queued | Self::NeedsInput)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = canonical(s);
        Self::ALL
            .into_iter()
            .find(|status| canonical(status.as_str()) == key)
            .ok_or_else(|| format!("invalid session status: {}", s.trim()))
    }
}

/// Where a session was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// Remote task reported by the hosted API
    AgentTask,
    /// Workspace descriptor found on local disk
    LocalCopilot,
}

impl Provenance {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AgentTask => "agent-task",
            Self::LocalCopilot => "local-copilot",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token accounting accumulated from log records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    /// Number of usage records merged into this total
    pub calls: u64,
    /// Last non-empty model name seen
    pub model: Option<String>,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    /// Fold another accumulator into this one. Counters add, the model of
    /// `other` wins when it has one.
    pub fn absorb(&mut self, other: &TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cached_tokens = self.cached_tokens.saturating_add(other.cached_tokens);
        self.calls = self.calls.saturating_add(other.calls);
        if other.model.is_some() {
            self.model.clone_from(&other.model);
        }
    }
}

/// A coding-agent session, independent of where it came from.
///
/// Sessions are rebuilt from scratch on every refresh; nothing mutates them
/// after normalization except the aggregator attaching `telemetry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    pub title: String,
    pub repository: String,
    pub branch: String,
    pub pr_url: Option<String>,
    pub pr_number: Option<u64>,
    /// `None` when the source did not say
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub source: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<TokenUsage>,
}

impl Session {
    /// Title used when a source supplies nothing better
    pub fn default_title(id: &str) -> String {
        format!("Session {}", id)
    }

    /// Key used to spot re-reports of the same piece of work
    pub fn duplicate_key(&self) -> (&str, &str, &str) {
        (&self.repository, &self.branch, &self.title)
    }

    /// Time since the last recorded activity, if known
    pub fn idle_for(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.updated_at.map(|t| now.signed_duration_since(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip_through_from_str() {
        for status in SessionStatus::ALL {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert_eq!(" Needs-Input ".parse::<SessionStatus>().unwrap(), SessionStatus::NeedsInput);
        assert!("sleeping".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn from_str_accepts_underscore_and_space_spellings() {
        for raw in ["needs_input", "NEEDS INPUT", "needs  -input"] {
            assert_eq!(raw.parse::<SessionStatus>().unwrap(), SessionStatus::NeedsInput);
        }
    }

    #[test]
    fn status_serializes_as_kebab_case() {
        let json = serde_json::to_string(&SessionStatus::NeedsInput).unwrap();
        assert_eq!(json, "\"needs-input\"");
        let json = serde_json::to_string(&Provenance::LocalCopilot).unwrap();
        assert_eq!(json, "\"local-copilot\"");
    }

    #[test]
    fn active_statuses() {
        assert!(SessionStatus::Running.is_active());
        assert!(SessionStatus::Queued.is_active());
        assert!(SessionStatus::NeedsInput.is_active());
        assert!(!SessionStatus::Completed.is_active());
        assert!(!SessionStatus::Failed.is_active());
        assert!(!SessionStatus::Unknown.is_active());
    }

    #[test]
    fn absorb_adds_counters_and_keeps_latest_model() {
        let mut total = TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
            cached_tokens: 2,
            calls: 1,
            model: Some("gpt-4.1".to_string()),
        };
        total.absorb(&TokenUsage {
            input_tokens: 3,
            output_tokens: 4,
            cached_tokens: 0,
            calls: 2,
            model: None,
        });
        assert_eq!(total.input_tokens, 13);
        assert_eq!(total.output_tokens, 9);
        assert_eq!(total.cached_tokens, 2);
        assert_eq!(total.calls, 3);
        assert_eq!(total.total_tokens(), 22);
        assert_eq!(total.model.as_deref(), Some("gpt-4.1"));

        total.absorb(&TokenUsage {
            model: Some("claude-sonnet-4".to_string()),
            ..Default::default()
        });
        assert_eq!(total.model.as_deref(), Some("claude-sonnet-4"));
    }
}
