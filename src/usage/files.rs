//! Selection and scanning of log files inside the usage window.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::scanner::UsageScanner;
use super::{merge_usage, UsageMap};

/// Logs older than this are not scanned
pub const DEFAULT_WINDOW_DAYS: i64 = 7;

struct LogFile {
    path: PathBuf,
    modified: DateTime<Utc>,
}

/// Log files modified inside `window` before `now`, oldest first
fn recent_logs(dir: &Path, window: Duration, now: DateTime<Utc>) -> Result<Vec<LogFile>> {
    let cutoff = now - window;
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read log directory: {:?}", dir))?;

    let mut logs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || path.extension().is_none_or(|ext| ext != "log") {
            continue;
        }

        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(t) => DateTime::<Utc>::from(t),
            Err(_) => DateTime::<Utc>::from(SystemTime::UNIX_EPOCH),
        };
        if modified < cutoff {
            continue;
        }

        logs.push(LogFile { path, modified });
    }

    logs.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
    Ok(logs)
}

/// Scan every recent `.log` file in `dir` and merge the per-file usage.
///
/// Files are read oldest first so the newest file decides the model name.
/// A missing directory yields an empty map; unreadable files are skipped.
pub fn scan_log_dir(dir: &Path, window: Duration, now: DateTime<Utc>) -> Result<UsageMap> {
    let mut usage = UsageMap::new();
    if !dir.exists() {
        return Ok(usage);
    }

    for log in recent_logs(dir, window, now)? {
        let bytes = match fs::read(&log.path) {
            Ok(b) => b,
            Err(e) => {
                debug!(path = %log.path.display(), error = %e, "skipping unreadable log");
                continue;
            }
        };
        let text = String::from_utf8_lossy(&bytes);
        merge_usage(&mut usage, UsageScanner::new().scan(&text));
    }

    Ok(usage)
}
