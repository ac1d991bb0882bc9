//! Error types at the engine's seams.

use thiserror::Error;

/// Why a single local descriptor could not become a session
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Neither parser could recover an identifier; the record is dropped
    #[error("no session identifier found in descriptor")]
    MissingSessionId,
    #[error("descriptor is not a structured document: {0}")]
    Structure(String),
}

/// Substrings that mean "you are not allowed to see this" rather than
/// "something broke".
const DENIAL_SIGNATURES: &[&str] = &[
    "http 403",
    "http 404",
    "not found",
    "resource not accessible",
    "permission denied",
    "must have admin rights",
    "forbidden",
];

/// Failure of an entire source for one refresh
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The source exists but is not available to this user; treated as a
    /// missing feature, not a failure
    #[error("{source_name} unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },
    #[error("{source_name} failed: {message}")]
    Failed { source_name: String, message: String },
}

impl SourceError {
    /// Build an error from a collaborator's failure message, recognizing
    /// known denial responses.
    pub fn from_message(source_name: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if DENIAL_SIGNATURES.iter().any(|sig| lower.contains(sig)) {
            Self::Unavailable {
                source_name: source_name.to_string(),
                reason: message,
            }
        } else {
            Self::Failed {
                source_name: source_name.to_string(),
                message,
            }
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    pub fn source_name(&self) -> &str {
        match self {
            Self::Unavailable { source_name, .. } | Self::Failed { source_name, .. } => {
                source_name
            }
        }
    }
}

/// Refresh-level failure: nothing usable came back
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("all session sources failed: {}", join_errors(.0))]
    AllSourcesFailed(Vec<SourceError>),
}

fn join_errors(errors: &[SourceError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_messages_are_unavailable() {
        for msg in [
            "HTTP 403: Resource not accessible by integration",
            "HTTP 404: Not Found (https://api.github.com/agents/swe/v0/jobs)",
            "permission denied while reading tasks",
        ] {
            let err = SourceError::from_message("agent-task", msg);
            assert!(err.is_unavailable(), "{msg}");
            assert_eq!(err.source_name(), "agent-task");
        }
    }

    #[test]
    fn other_messages_are_failures() {
        let err = SourceError::from_message("agent-task", "connection reset by peer");
        assert!(!err.is_unavailable());
        assert_eq!(
            err.to_string(),
            "agent-task failed: connection reset by peer"
        );
    }

    #[test]
    fn all_sources_failed_lists_every_source() {
        let err = AggregateError::AllSourcesFailed(vec![
            SourceError::from_message("agent-task", "timeout"),
            SourceError::from_message("local-copilot", "I/O error"),
        ]);
        let text = err.to_string();
        assert!(text.contains("agent-task failed: timeout"));
        assert!(text.contains("local-copilot failed: I/O error"));
    }
}
