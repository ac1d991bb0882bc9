//! Discovery of local workspace descriptors on disk.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::parser::parse_session;
use super::question::{QuestionDetector, TrailingQuestion};
use crate::error::SourceError;
use crate::refresh::SessionFeed;
use crate::session::{Provenance, Session};

/// File name of the descriptor inside a per-session directory
pub const DESCRIPTOR_FILE: &str = "workspace.yaml";

/// Reads every descriptor under a session-state directory.
///
/// Layouts accepted: `<dir>/<id>/workspace.yaml` and loose `<dir>/*.yaml`.
pub struct LocalFeed {
    dir: PathBuf,
    detector: Box<dyn QuestionDetector + Send + Sync>,
}

impl LocalFeed {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            detector: Box::new(TrailingQuestion),
        }
    }

    /// Replace the heuristic used to spot pending questions
    pub fn with_detector(mut self, detector: impl QuestionDetector + Send + Sync + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Find candidate descriptor files. A missing directory is not an error.
    fn descriptor_paths(&self) -> Result<Vec<PathBuf>, SourceError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir).map_err(|e| {
            SourceError::from_message(
                self.name(),
                format!("failed to read {}: {}", self.dir.display(), e),
            )
        })?;

        let mut paths = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                let descriptor = path.join(DESCRIPTOR_FILE);
                if descriptor.is_file() {
                    paths.push(descriptor);
                }
            } else if path
                .extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml")
            {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

impl SessionFeed for LocalFeed {
    fn name(&self) -> &'static str {
        Provenance::LocalCopilot.as_str()
    }

    fn fetch(&self, now: DateTime<Utc>) -> Result<Vec<Session>, SourceError> {
        let mut sessions = Vec::new();

        for path in self.descriptor_paths()? {
            let bytes = match fs::read(&path) {
                Ok(b) => b,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "skipping unreadable descriptor");
                    continue;
                }
            };

            match parse_session(&bytes, self.detector.as_ref(), now) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "dropping descriptor");
                }
            }
        }

        Ok(sessions)
    }
}
