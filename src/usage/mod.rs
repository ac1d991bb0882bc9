//! Token usage recovered from process logs.

pub mod files;
pub mod scanner;

use std::collections::HashMap;

use crate::session::TokenUsage;

pub use files::{scan_log_dir, DEFAULT_WINDOW_DAYS};
pub use scanner::{normalize_model, LineOutcome, ScanState, UsageScanner};

/// Key for usage seen before any session marker
pub const UNKNOWN_SESSION: &str = "_unknown";

/// Accumulated usage keyed by session id
pub type UsageMap = HashMap<String, TokenUsage>;

/// Fold `other` into `into`; entries from `other` are treated as newer
pub fn merge_usage(into: &mut UsageMap, other: UsageMap) {
    for (session_id, usage) in other {
        into.entry(session_id).or_default().absorb(&usage);
    }
}
