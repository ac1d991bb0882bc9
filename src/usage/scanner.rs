//! Line scanner that pulls token usage out of CLI process logs.
//!
//! Logs interleave session markers, response traces and unrelated output.
//! Usage JSON is only trusted when it directly follows a response header,
//! and is attributed to the session named by the most recent flush marker.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use super::{UsageMap, UNKNOWN_SESSION};
use crate::session::TokenUsage;

static FLUSH_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)flushed\s+\d+\s+events?\s+to\s+session\s+([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})",
    )
    .expect("flush marker pattern is valid")
});

/// Leading `2026-01-01T00:00:00.000Z [DEBUG]` style prefix
static LOG_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d{4}-\d{2}-\d{2}[T ][0-9:.]+(Z|[+-]\d{2}:?\d{2})?\s*)?(\[[A-Za-z]+\]\s*)*")
        .expect("log prefix pattern is valid")
});

/// Where the scanner is relative to a response trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Outside,
    /// A response header was seen; the next JSON line is its payload
    InResponse,
}

/// What a single line did to the scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Line carried nothing of interest
    Ignored,
    /// Flush marker switched the current session
    SessionMarked(String),
    ResponseOpened,
    /// Intermediate `data:` line inside a response
    DataLine,
    /// Usage merged under this session key
    UsageRecorded(String),
    /// JSON parsed but reported zero tokens
    EmptyUsage,
    /// JSON could not be parsed; the response stays open
    MalformedJson,
    /// An unrelated line closed the response; carries what the line did
    /// once re-read outside the response
    ResponseAbandoned(Box<LineOutcome>),
}

#[derive(Debug, Default, Deserialize)]
struct ResponsePayload {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<UsagePayload>,
}

#[derive(Debug, Default, Deserialize)]
struct UsagePayload {
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<PromptDetails>,
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Default, Deserialize)]
struct PromptDetails {
    #[serde(default)]
    cached_tokens: u64,
}

/// `provider:model` becomes `model`; blank names are dropped
pub fn normalize_model(raw: &str) -> Option<String> {
    let name = raw.trim();
    let name = name.rsplit_once(':').map_or(name, |(_, model)| model).trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Text after the timestamp and level tags
fn message_body(line: &str) -> &str {
    let prefix_len = LOG_PREFIX.find(line).map_or(0, |m| m.end());
    line[prefix_len..].trim()
}

/// `response (Request-ID ..):` or `response:`, not any message that
/// merely begins with the word
fn is_response_header(body: &str) -> bool {
    let Some(head) = body.get(.."response".len()) else {
        return false;
    };
    if !head.eq_ignore_ascii_case("response") {
        return false;
    }
    body["response".len()..]
        .trim_start()
        .starts_with(['(', ':'])
}

fn embedded_json(line: &str) -> Option<&str> {
    let start = line.find('{')?;
    let end = line.rfind('}')?;
    (end > start).then(|| &line[start..=end])
}

/// Stateful scanner over one log's lines
#[derive(Debug, Default)]
pub struct UsageScanner {
    state: ScanState,
    current_session: Option<String>,
    usage: UsageMap,
}

impl UsageScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn current_session(&self) -> Option<&str> {
        self.current_session.as_deref()
    }

    /// Advance the scanner by one line
    pub fn feed_line(&mut self, line: &str) -> LineOutcome {
        match self.state {
            ScanState::Outside => self.outside(line),
            ScanState::InResponse => self.in_response(line),
        }
    }

    /// Scan a whole log and return the accumulated usage
    pub fn scan(mut self, text: &str) -> UsageMap {
        for line in text.lines() {
            self.feed_line(line);
        }
        self.finish()
    }

    pub fn finish(self) -> UsageMap {
        self.usage
    }

    fn outside(&mut self, line: &str) -> LineOutcome {
        if let Some(caps) = FLUSH_MARKER.captures(line) {
            // Kept as written so it joins against the descriptor's id
            let session_id = caps[1].to_string();
            self.current_session = Some(session_id.clone());
            return LineOutcome::SessionMarked(session_id);
        }

        if is_response_header(message_body(line)) {
            self.state = ScanState::InResponse;
            return LineOutcome::ResponseOpened;
        }

        LineOutcome::Ignored
    }

    fn in_response(&mut self, line: &str) -> LineOutcome {
        if let Some(json) = embedded_json(line) {
            return self.record(json);
        }

        let body = message_body(line);
        if body.eq_ignore_ascii_case("data:") {
            return LineOutcome::DataLine;
        }

        // Not part of this response: close it and read the line afresh
        self.state = ScanState::Outside;
        LineOutcome::ResponseAbandoned(Box::new(self.outside(line)))
    }

    fn record(&mut self, json: &str) -> LineOutcome {
        let payload: ResponsePayload = match serde_json::from_str(json) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "skipping malformed usage payload");
                return LineOutcome::MalformedJson;
            }
        };

        self.state = ScanState::Outside;

        let Some(usage) = payload.usage.filter(|u| u.total_tokens > 0) else {
            return LineOutcome::EmptyUsage;
        };

        let key = self
            .current_session
            .clone()
            .unwrap_or_else(|| UNKNOWN_SESSION.to_string());

        let entry = self.usage.entry(key.clone()).or_default();
        entry.absorb(&TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            cached_tokens: usage
                .prompt_tokens_details
                .map_or(0, |details| details.cached_tokens),
            calls: 1,
            model: payload.model.as_deref().and_then(normalize_model),
        });

        LineOutcome::UsageRecorded(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S1: &str = "0a1b2c3d-4e5f-6a7b-8c9d-0e1f2a3b4c5d";
    const S2: &str = "ffeeddcc-bbaa-4999-8888-777766665555";

    fn usage_line(model: &str, prompt: u64, completion: u64, cached: u64) -> String {
        format!(
            r#"{{"model":"{model}","usage":{{"completion_tokens":{completion},"prompt_tokens":{prompt},"prompt_tokens_details":{{"cached_tokens":{cached}}},"total_tokens":{}}}}}"#,
            prompt + completion
        )
    }

    #[test]
    fn two_sessions_split_two_to_one() {
        let log = [
            format!("2026-03-01T10:00:00.000Z [DEBUG] Flushed 3 events to session {S1}"),
            "2026-03-01T10:00:01.000Z [DEBUG] response (Request-ID 1):".to_string(),
            "2026-03-01T10:00:01.000Z [DEBUG] data:".to_string(),
            usage_line("gpt-4.1", 100, 20, 10),
            "2026-03-01T10:00:02.000Z [INFO] tool call finished".to_string(),
            "2026-03-01T10:00:03.000Z [DEBUG] response (Request-ID 2):".to_string(),
            usage_line("openai:gpt-5", 200, 30, 50),
            format!("2026-03-01T10:01:00.000Z [DEBUG] Flushed 1 events to session {S2}"),
            "2026-03-01T10:01:01.000Z [DEBUG] response (Request-ID 3):".to_string(),
            usage_line("claude-sonnet-4", 7, 3, 0),
        ]
        .join("\n");

        let usage = UsageScanner::new().scan(&log);
        assert_eq!(usage.len(), 2);

        let first = &usage[S1];
        assert_eq!(first.calls, 2);
        assert_eq!(first.input_tokens, 300);
        assert_eq!(first.output_tokens, 50);
        assert_eq!(first.cached_tokens, 60);
        assert_eq!(first.model.as_deref(), Some("gpt-5"));

        let second = &usage[S2];
        assert_eq!(second.calls, 1);
        assert_eq!(second.input_tokens, 7);
        assert_eq!(second.output_tokens, 3);
        assert_eq!(second.cached_tokens, 0);
        assert_eq!(second.model.as_deref(), Some("claude-sonnet-4"));
    }

    #[test]
    fn zero_totals_and_bad_json_are_skipped() {
        let log = [
            format!("Flushed 2 events to session {S1}"),
            "[DEBUG] response (Request-ID a):".to_string(),
            r#"{"model":"gpt-4.1","usage":{"prompt_tokens":0,"completion_tokens":0,"total_tokens":0}}"#
                .to_string(),
            "[DEBUG] response (Request-ID b):".to_string(),
            r#"{"model": "gpt-4.1", "usage": {"prompt_tokens": 5,"#.to_string() + "}",
            usage_line("gpt-4.1", 5, 5, 1),
            "[DEBUG] response (Request-ID c):".to_string(),
            usage_line("", 1, 1, 0),
        ]
        .join("\n");

        let usage = UsageScanner::new().scan(&log);
        assert_eq!(usage.len(), 1);
        let entry = &usage[S1];
        assert_eq!(entry.calls, 2);
        assert_eq!(entry.input_tokens, 6);
        assert_eq!(entry.output_tokens, 6);
        assert_eq!(entry.cached_tokens, 1);
        // Blank model does not overwrite the last real one
        assert_eq!(entry.model.as_deref(), Some("gpt-4.1"));
    }

    #[test]
    fn usage_before_any_marker_goes_to_unknown() {
        let log = ["response (Request-ID x):".to_string(), usage_line("m", 1, 2, 0)].join("\n");
        let usage = UsageScanner::new().scan(&log);
        assert_eq!(usage[UNKNOWN_SESSION].calls, 1);
    }

    #[test]
    fn json_outside_a_response_is_ignored() {
        let mut scanner = UsageScanner::new();
        scanner.feed_line(&format!("Flushed 1 events to session {S1}"));
        assert_eq!(scanner.feed_line(&usage_line("m", 1, 1, 0)), LineOutcome::Ignored);
        assert!(scanner.finish().is_empty());
    }

    #[test]
    fn unrelated_line_closes_the_response_without_being_consumed() {
        let mut scanner = UsageScanner::new();
        assert_eq!(
            scanner.feed_line("[DEBUG] response (Request-ID 1):"),
            LineOutcome::ResponseOpened
        );
        assert_eq!(scanner.feed_line("[DEBUG] data:"), LineOutcome::DataLine);
        assert_eq!(scanner.state(), ScanState::InResponse);

        // A flush marker ends the response and still switches the session
        let outcome = scanner.feed_line(&format!("[DEBUG] Flushed 4 events to session {S2}"));
        assert_eq!(
            outcome,
            LineOutcome::ResponseAbandoned(Box::new(LineOutcome::SessionMarked(S2.to_string())))
        );
        assert_eq!(scanner.state(), ScanState::Outside);
        assert_eq!(scanner.current_session(), Some(S2));

        // JSON arriving after the response was abandoned is not attributed
        assert_eq!(scanner.feed_line(&usage_line("m", 9, 9, 0)), LineOutcome::Ignored);
        assert!(scanner.finish().is_empty());
    }

    #[test]
    fn new_response_header_reopens_after_abandon() {
        let mut scanner = UsageScanner::new();
        scanner.feed_line("response (Request-ID 1):");
        assert_eq!(
            scanner.feed_line("[INFO] response (Request-ID 2):"),
            LineOutcome::ResponseAbandoned(Box::new(LineOutcome::ResponseOpened))
        );
        assert_eq!(scanner.state(), ScanState::InResponse);
    }

    #[test]
    fn malformed_json_keeps_response_open() {
        let mut scanner = UsageScanner::new();
        scanner.feed_line("response:");
        assert_eq!(scanner.feed_line("{not json}"), LineOutcome::MalformedJson);
        assert_eq!(scanner.state(), ScanState::InResponse);
        assert!(matches!(
            scanner.feed_line(&usage_line("m", 1, 1, 0)),
            LineOutcome::UsageRecorded(_)
        ));
        assert_eq!(scanner.state(), ScanState::Outside);
    }

    #[test]
    fn marker_id_keeps_its_case() {
        let upper = S1.to_uppercase();
        let mut scanner = UsageScanner::new();
        assert_eq!(
            scanner.feed_line(&format!("Flushed 1 events to session {upper}")),
            LineOutcome::SessionMarked(upper.clone())
        );
        scanner.feed_line("response (Request-ID 1):");
        scanner.feed_line(&usage_line("m", 1, 1, 0));
        let usage = scanner.finish();
        assert_eq!(usage[upper.as_str()].calls, 1);
        assert!(!usage.contains_key(S1));
    }

    #[test]
    fn only_header_shaped_lines_open_a_response() {
        assert!(is_response_header("response (Request-ID 1):"));
        assert!(is_response_header("Response:"));
        assert!(is_response_header("response  (id)"));
        assert!(!is_response_header("Responses API enabled"));
        assert!(!is_response_header("response_format=json"));
        assert!(!is_response_header("resp"));

        let mut scanner = UsageScanner::new();
        scanner.feed_line(&format!("Flushed 1 events to session {S1}"));
        assert_eq!(scanner.feed_line("[INFO] Responses API enabled"), LineOutcome::Ignored);
        assert_eq!(scanner.feed_line(&usage_line("m", 4, 4, 0)), LineOutcome::Ignored);
        assert!(scanner.finish().is_empty());
    }

    #[test]
    fn model_prefix_is_stripped() {
        assert_eq!(normalize_model("openai:gpt-4.1").as_deref(), Some("gpt-4.1"));
        assert_eq!(normalize_model("gpt-4.1").as_deref(), Some("gpt-4.1"));
        assert_eq!(normalize_model("  "), None);
        assert_eq!(normalize_model("azure:"), None);
    }

    #[test]
    fn message_body_strips_timestamp_and_levels() {
        assert_eq!(
            message_body("2026-03-01T10:00:00.123Z [DEBUG] response (Request-ID 1):"),
            "response (Request-ID 1):"
        );
        assert_eq!(message_body("[ERROR] [copilot] data:"), "data:");
        assert_eq!(message_body("plain"), "plain");
    }
}
