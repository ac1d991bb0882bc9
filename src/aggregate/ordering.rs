//! Display ordering and quiet-duplicate detection.

use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use super::SessionView;
use crate::session::SessionStatus;

/// Status grouping used for display, most actionable first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Lane {
    /// Running, queued, or waiting on the user
    Active,
    Failed,
    Completed,
    Unknown,
}

impl Lane {
    pub fn of(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Running | SessionStatus::Queued | SessionStatus::NeedsInput => {
                Self::Active
            }
            SessionStatus::Failed => Self::Failed,
            SessionStatus::Completed => Self::Completed,
            SessionStatus::Unknown => Self::Unknown,
        }
    }
}

/// Flag sessions that re-report newer work with the same repository,
/// branch and title. The newest instance of each key is canonical; older
/// ones are flagged only once they have been quiet for longer than `window`.
pub fn mark_quiet_duplicates(views: &mut [SessionView], window: Duration, now: DateTime<Utc>) {
    let mut groups: HashMap<(String, String, String), Vec<usize>> = HashMap::new();
    for (idx, view) in views.iter().enumerate() {
        let (repo, branch, title) = view.session.duplicate_key();
        groups
            .entry((repo.to_string(), branch.to_string(), title.to_string()))
            .or_default()
            .push(idx);
    }

    for indices in groups.values().filter(|indices| indices.len() > 1) {
        let mut canonical = indices[0];
        for &idx in &indices[1..] {
            if views[idx].session.updated_at > views[canonical].session.updated_at {
                canonical = idx;
            }
        }
        let newest = views[canonical].session.updated_at;

        for &idx in indices {
            let updated_at = views[idx].session.updated_at;
            let older = updated_at < newest;
            let quiet = updated_at.is_none_or(|t| now.signed_duration_since(t) > window);
            if idx != canonical && older && quiet {
                views[idx].quiet_duplicate = true;
            }
        }
    }
}

/// Sort for display: by lane; inside a lane quiet duplicates sink to the
/// end, sessions waiting on the user lead, then most recently updated.
pub fn prioritize(views: &mut [SessionView], window: Duration, now: DateTime<Utc>) {
    mark_quiet_duplicates(views, window, now);
    views.sort_by(|a, b| {
        let key = |v: &SessionView| {
            (
                Lane::of(v.session.status),
                v.quiet_duplicate,
                v.session.status != SessionStatus::NeedsInput,
                Reverse(v.session.updated_at),
            )
        };
        key(a)
            .cmp(&key(b))
            .then_with(|| a.session.id.cmp(&b.session.id))
    });
}
