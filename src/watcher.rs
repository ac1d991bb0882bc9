use anyhow::{Context, Result};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;
use tracing::debug;

/// File extensions whose changes warrant a refresh
const WATCHED_EXTENSIONS: &[&str] = &["yaml", "yml", "json", "log"];

fn is_relevant(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| WATCHED_EXTENSIONS.contains(&ext))
}

/// Watches source directories and reports changed descriptor, task and log files
pub struct ChangeWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<PathBuf>,
}

impl ChangeWatcher {
    /// Watch every existing directory in `dirs`; missing ones are skipped
    pub fn new<P: AsRef<Path>>(dirs: &[P]) -> Result<Self> {
        let (tx, rx) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                        for path in event.paths.into_iter().filter(|p| is_relevant(p)) {
                            let _ = tx.send(path);
                        }
                    }
                }
            },
            Config::default().with_poll_interval(Duration::from_millis(500)),
        )
        .context("Failed to create file watcher")?;

        for dir in dirs {
            let dir = dir.as_ref();
            if !dir.is_dir() {
                debug!(dir = %dir.display(), "not watching missing directory");
                continue;
            }
            watcher
                .watch(dir, RecursiveMode::Recursive)
                .with_context(|| format!("Failed to watch {}", dir.display()))?;
        }

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Try to receive a changed file path (non-blocking)
    pub fn try_recv(&self) -> Option<PathBuf> {
        self.rx.try_recv().ok()
    }

    /// Block until something changes, then drain the burst that follows.
    ///
    /// Returns the distinct paths seen, or an empty list on timeout.
    pub fn wait(&self, timeout: Duration, settle: Duration) -> Vec<PathBuf> {
        let mut changed = match self.rx.recv_timeout(timeout) {
            Ok(path) => vec![path],
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return Vec::new(),
        };

        while let Ok(path) = self.rx.recv_timeout(settle) {
            if !changed.contains(&path) {
                changed.push(path);
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn only_source_files_are_relevant() {
        assert!(is_relevant(Path::new("/s/abc/workspace.yaml")));
        assert!(is_relevant(Path::new("/logs/process-1.log")));
        assert!(is_relevant(Path::new("/cache/tasks.json")));
        assert!(!is_relevant(Path::new("/s/abc/notes.txt")));
        assert!(!is_relevant(Path::new("/s/abc/lockfile")));
    }

    #[test]
    fn missing_directories_are_skipped() {
        let watcher = ChangeWatcher::new(&["/tmp/agentdeck_nonexistent_watch_dir"]).unwrap();
        assert!(watcher.try_recv().is_none());
    }

    #[test]
    fn reports_new_descriptor() {
        let temp_dir = tempfile::tempdir().unwrap();
        let watcher = ChangeWatcher::new(&[temp_dir.path()]).unwrap();

        fs::write(temp_dir.path().join("s1.yaml"), "id: s1\n").unwrap();

        let changed = watcher.wait(Duration::from_secs(5), Duration::from_millis(100));
        assert!(changed.iter().any(|p| p.ends_with("s1.yaml")));
    }
}
