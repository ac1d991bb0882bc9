//! Merging, filtering and ordering of sessions from every source.
//!
//! One call to [`Aggregator::aggregate`] is one refresh cycle: it takes the
//! per-source results, the dismissed snapshot and the usage map, and returns
//! the list the presentation layer shows plus the counters for its tabs.

pub mod dismissed;
pub mod ordering;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{AggregateError, SourceError};
use crate::session::{Provenance, Session, SessionStatus};
use crate::usage::UsageMap;

pub use dismissed::{DismissedSet, DismissedStore};
pub use ordering::Lane;

/// Tunable time windows for attention and duplicate detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Quiet time after which an active session needs attention
    pub stale_after: Duration,
    /// Quiet time after which an older duplicate is demoted
    pub quiet_duplicate_after: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            stale_after: Duration::minutes(30),
            quiet_duplicate_after: Duration::minutes(60),
        }
    }
}

/// Which sessions the current view shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    /// Needs input, failed, or active but gone quiet
    Attention,
    /// Running, queued, or needs input
    Active,
    Status(SessionStatus),
}

impl StatusFilter {
    pub fn matches(&self, view: &SessionView) -> bool {
        match self {
            Self::All => true,
            Self::Attention => view.needs_attention,
            Self::Active => view.session.status.is_active(),
            Self::Status(status) => view.session.status == *status,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "all" => Ok(Self::All),
            "attention" | "needs-attention" => Ok(Self::Attention),
            "active" => Ok(Self::Active),
            other => other
                .parse::<SessionStatus>()
                .map(Self::Status)
                .map_err(|_| format!("unknown filter: {other}")),
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Attention => f.write_str("attention"),
            Self::Active => f.write_str("active"),
            Self::Status(status) => write!(f, "{}", status),
        }
    }
}

/// Counters for summary tabs, computed before filtering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SummaryCounts {
    pub total: usize,
    pub attention: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

impl SummaryCounts {
    fn add(&mut self, view: &SessionView) {
        self.total += 1;
        if view.needs_attention {
            self.attention += 1;
        }
        if view.session.status.is_active() {
            self.active += 1;
        }
        match view.session.status {
            SessionStatus::Completed => self.completed += 1,
            SessionStatus::Failed => self.failed += 1,
            _ => {}
        }
    }

    /// Label/count pairs in tab order
    pub fn categories(&self) -> [(&'static str, usize); 5] {
        [
            ("all", self.total),
            ("attention", self.attention),
            ("active", self.active),
            ("completed", self.completed),
            ("failed", self.failed),
        ]
    }
}

/// A session ready for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    pub needs_attention: bool,
    /// Older, quiet re-report of another visible session
    pub quiet_duplicate: bool,
}

/// Result of one refresh cycle
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub entries: Vec<SessionView>,
    pub counts: SummaryCounts,
    /// Sources that failed or were unavailable this cycle
    pub warnings: Vec<SourceError>,
}

impl Snapshot {
    /// True when some source failed outright (not merely unavailable)
    pub fn is_partial(&self) -> bool {
        self.warnings.iter().any(|w| !w.is_unavailable())
    }
}

/// Applies the per-refresh pipeline
#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator {
    thresholds: Thresholds,
}

impl Aggregator {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Needs input, failed, or active and quiet for longer than the
    /// staleness threshold. Unknown activity time is not taken as quiet.
    pub fn needs_attention(&self, session: &Session, now: DateTime<Utc>) -> bool {
        match session.status {
            SessionStatus::NeedsInput | SessionStatus::Failed => true,
            status if status.is_active() => session
                .idle_for(now)
                .is_some_and(|idle| idle > self.thresholds.stale_after),
            _ => false,
        }
    }

    pub fn aggregate(
        &self,
        batches: Vec<Result<Vec<Session>, SourceError>>,
        dismissed: &DismissedSet,
        usage: &UsageMap,
        filter: StatusFilter,
        now: DateTime<Utc>,
    ) -> Result<Snapshot, AggregateError> {
        let (sessions, warnings) = collect(batches)?;

        let mut views: Vec<SessionView> = dedupe(sessions)
            .into_iter()
            .filter(|session| !dismissed.contains(&session.id))
            .map(|mut session| {
                session.telemetry = usage.get(&session.id).cloned();
                SessionView {
                    needs_attention: self.needs_attention(&session, now),
                    quiet_duplicate: false,
                    session,
                }
            })
            .collect();

        let mut counts = SummaryCounts::default();
        for view in &views {
            counts.add(view);
        }

        views.retain(|view| filter.matches(view));
        ordering::prioritize(&mut views, self.thresholds.quiet_duplicate_after, now);

        info!(
            total = counts.total,
            shown = views.len(),
            attention = counts.attention,
            filter = %filter,
            "refreshed sessions"
        );

        Ok(Snapshot {
            entries: views,
            counts,
            warnings,
        })
    }
}

/// Gather every successful batch. Fails only when no source succeeded and
/// at least one of them genuinely broke.
fn collect(
    batches: Vec<Result<Vec<Session>, SourceError>>,
) -> Result<(Vec<Session>, Vec<SourceError>), AggregateError> {
    let mut sessions = Vec::new();
    let mut warnings = Vec::new();
    let mut any_ok = false;

    for batch in batches {
        match batch {
            Ok(batch) => {
                any_ok = true;
                sessions.extend(batch);
            }
            Err(err) => {
                warn!(source = err.source_name(), error = %err, "session source failed");
                warnings.push(err);
            }
        }
    }

    if !any_ok && warnings.iter().any(|w| !w.is_unavailable()) {
        return Err(AggregateError::AllSourcesFailed(warnings));
    }
    Ok((sessions, warnings))
}

/// Keep one session per `(source, id)`, preferring the most recently updated
fn dedupe(sessions: Vec<Session>) -> Vec<Session> {
    let mut index: HashMap<(Provenance, String), usize> = HashMap::new();
    let mut unique: Vec<Session> = Vec::with_capacity(sessions.len());

    for session in sessions {
        let key = (session.source, session.id.clone());
        match index.get(&key) {
            Some(&idx) => {
                if session.updated_at > unique[idx].updated_at {
                    unique[idx] = session;
                }
            }
            None => {
                index.insert(key, unique.len());
                unique.push(session);
            }
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TokenUsage;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn session(id: &str, source: Provenance, status: SessionStatus, minutes_ago: i64) -> Session {
        Session {
            id: id.to_string(),
            status,
            title: format!("Task {id}"),
            repository: "acme/api".to_string(),
            branch: format!("branch-{id}"),
            pr_url: None,
            pr_number: None,
            created_at: None,
            updated_at: Some(now() - Duration::minutes(minutes_ago)),
            source,
            telemetry: None,
        }
    }

    fn aggregate(
        batches: Vec<Result<Vec<Session>, SourceError>>,
        dismissed: &DismissedSet,
        filter: StatusFilter,
    ) -> Snapshot {
        Aggregator::default()
            .aggregate(batches, dismissed, &UsageMap::new(), filter, now())
            .unwrap()
    }

    #[test]
    fn remote_and_local_sessions_are_both_kept() {
        let snapshot = aggregate(
            vec![
                Ok(vec![session("r1", Provenance::AgentTask, SessionStatus::Running, 1)]),
                Ok(vec![session("l1", Provenance::LocalCopilot, SessionStatus::Running, 2)]),
            ],
            &DismissedSet::default(),
            StatusFilter::All,
        );
        assert_eq!(snapshot.entries.len(), 2);
        assert_eq!(snapshot.entries[0].session.source, Provenance::AgentTask);
        assert_eq!(snapshot.entries[1].session.source, Provenance::LocalCopilot);
        assert!(snapshot.warnings.is_empty());
    }

    #[test]
    fn failed_source_yields_partial_result() {
        let snapshot = aggregate(
            vec![
                Err(SourceError::from_message("agent-task", "connection refused")),
                Ok(vec![session("l1", Provenance::LocalCopilot, SessionStatus::Running, 2)]),
            ],
            &DismissedSet::default(),
            StatusFilter::All,
        );
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.warnings.len(), 1);
        assert!(snapshot.is_partial());
    }

    #[test]
    fn all_sources_failing_is_an_error() {
        let result = Aggregator::default().aggregate(
            vec![
                Err(SourceError::from_message("agent-task", "timeout")),
                Err(SourceError::from_message("local-copilot", "I/O error")),
            ],
            &DismissedSet::default(),
            &UsageMap::new(),
            StatusFilter::All,
            now(),
        );
        assert!(matches!(result, Err(AggregateError::AllSourcesFailed(errs)) if errs.len() == 2));
    }

    #[test]
    fn unavailable_sources_alone_are_not_an_error() {
        let snapshot = aggregate(
            vec![Err(SourceError::from_message("agent-task", "HTTP 403: Forbidden"))],
            &DismissedSet::default(),
            StatusFilter::All,
        );
        assert!(snapshot.entries.is_empty());
        assert!(!snapshot.is_partial());
    }

    #[test]
    fn dismissed_sessions_vanish_from_list_and_counts() {
        let dismissed: DismissedSet = ["gone"].into_iter().collect();
        let snapshot = aggregate(
            vec![Ok(vec![
                session("gone", Provenance::AgentTask, SessionStatus::Failed, 1),
                session("kept", Provenance::AgentTask, SessionStatus::Completed, 1),
            ])],
            &dismissed,
            StatusFilter::All,
        );
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].session.id, "kept");
        assert_eq!(snapshot.counts.total, 1);
        assert_eq!(snapshot.counts.failed, 0);
        assert_eq!(snapshot.counts.attention, 0);
        assert_eq!(snapshot.counts.completed, 1);
    }

    #[test]
    fn same_source_and_id_appear_once() {
        let older = session("dup", Provenance::AgentTask, SessionStatus::Running, 90);
        let mut newer = session("dup", Provenance::AgentTask, SessionStatus::Completed, 1);
        newer.title = "newer".to_string();
        let other_source = session("dup", Provenance::LocalCopilot, SessionStatus::Running, 5);

        let snapshot = aggregate(
            vec![Ok(vec![older, newer]), Ok(vec![other_source])],
            &DismissedSet::default(),
            StatusFilter::All,
        );
        assert_eq!(snapshot.entries.len(), 2);
        let remote = snapshot
            .entries
            .iter()
            .find(|v| v.session.source == Provenance::AgentTask)
            .unwrap();
        assert_eq!(remote.session.title, "newer");
    }

    #[test]
    fn telemetry_attaches_only_on_match() {
        let mut usage = UsageMap::new();
        usage.insert(
            "with".to_string(),
            TokenUsage {
                input_tokens: 10,
                output_tokens: 2,
                calls: 1,
                ..Default::default()
            },
        );
        let snapshot = Aggregator::default()
            .aggregate(
                vec![Ok(vec![
                    session("with", Provenance::LocalCopilot, SessionStatus::Running, 1),
                    session("without", Provenance::LocalCopilot, SessionStatus::Running, 2),
                ])],
                &DismissedSet::default(),
                &usage,
                StatusFilter::All,
                now(),
            )
            .unwrap();
        let with = &snapshot.entries[0];
        assert_eq!(with.session.id, "with");
        assert_eq!(with.session.telemetry.as_ref().unwrap().input_tokens, 10);
        assert!(snapshot.entries[1].session.telemetry.is_none());
    }

    #[test]
    fn counts_are_computed_before_filtering() {
        let batch = vec![
            session("blocked", Provenance::AgentTask, SessionStatus::NeedsInput, 1),
            session("busy", Provenance::AgentTask, SessionStatus::Running, 1),
            session("stuck", Provenance::AgentTask, SessionStatus::Running, 45),
            session("waiting", Provenance::AgentTask, SessionStatus::Queued, 2),
            session("broke", Provenance::AgentTask, SessionStatus::Failed, 600),
            session("done", Provenance::AgentTask, SessionStatus::Completed, 600),
        ];

        let all = aggregate(vec![Ok(batch.clone())], &DismissedSet::default(), StatusFilter::All);
        let expected = SummaryCounts {
            total: 6,
            attention: 3,
            active: 4,
            completed: 1,
            failed: 1,
        };
        assert_eq!(all.counts, expected);

        let attention = aggregate(
            vec![Ok(batch.clone())],
            &DismissedSet::default(),
            StatusFilter::Attention,
        );
        assert_eq!(attention.counts, expected);
        let mut ids: Vec<_> = attention.entries.iter().map(|v| v.session.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["blocked", "broke", "stuck"]);

        let active = aggregate(vec![Ok(batch.clone())], &DismissedSet::default(), StatusFilter::Active);
        assert_eq!(active.entries.len(), 4);
        assert_eq!(active.entries[0].session.id, "blocked");

        let done = aggregate(
            vec![Ok(batch)],
            &DismissedSet::default(),
            StatusFilter::Status(SessionStatus::Completed),
        );
        assert_eq!(done.entries.len(), 1);
        assert_eq!(done.counts, expected);
    }

    #[test]
    fn attention_threshold_is_configurable() {
        let strict = Aggregator::new(Thresholds {
            stale_after: Duration::minutes(5),
            quiet_duplicate_after: Duration::minutes(60),
        });
        let s = session("s", Provenance::AgentTask, SessionStatus::Running, 10);
        assert!(strict.needs_attention(&s, now()));
        assert!(!Aggregator::default().needs_attention(&s, now()));

        let mut undated = s.clone();
        undated.updated_at = None;
        assert!(!strict.needs_attention(&undated, now()));

        let done = session("d", Provenance::AgentTask, SessionStatus::Completed, 10_000);
        assert!(!strict.needs_attention(&done, now()));
    }

    #[test]
    fn filters_parse_from_names() {
        assert_eq!("".parse::<StatusFilter>().unwrap(), StatusFilter::All);
        assert_eq!("Attention".parse::<StatusFilter>().unwrap(), StatusFilter::Attention);
        assert_eq!("active".parse::<StatusFilter>().unwrap(), StatusFilter::Active);
        assert_eq!(
            "needs-input".parse::<StatusFilter>().unwrap(),
            StatusFilter::Status(SessionStatus::NeedsInput)
        );
        assert_eq!(
            "needs_input".parse::<StatusFilter>().unwrap(),
            StatusFilter::Status(SessionStatus::NeedsInput)
        );
        assert!("bogus".parse::<StatusFilter>().is_err());
        assert_eq!(StatusFilter::Status(SessionStatus::Failed).to_string(), "failed");
    }
}
