use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Read-only view of dismissed session ids for one refresh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DismissedSet(HashSet<String>);

impl DismissedSet {
    pub fn contains(&self, session_id: &str) -> bool {
        self.0.contains(session_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for DismissedSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Dismissal metadata for a single session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DismissedEntry {
    pub dismissed_at: DateTime<Utc>,
}

/// On-disk dismissal state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DismissedState {
    pub version: u32,
    #[serde(default)]
    pub sessions: HashMap<String, DismissedEntry>,
}

impl Default for DismissedState {
    fn default() -> Self {
        Self {
            version: 1,
            sessions: HashMap::new(),
        }
    }
}

/// Persistent store of dismissed sessions.
///
/// Owned by the presentation layer; the engine only ever sees a
/// `DismissedSet` snapshot taken before a refresh.
pub struct DismissedStore {
    path: PathBuf,
    state: DismissedState,
    dirty: bool,
}

impl DismissedStore {
    /// Load `dismissed.json` from `dir`, or start empty
    pub fn new(dir: &Path) -> Result<Self> {
        let path = dir.join("dismissed.json");

        let state = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read dismissed file: {:?}", path))?;

            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse dismissed file: {:?}", path))?
        } else {
            DismissedState::default()
        };

        Ok(Self {
            path,
            state,
            dirty: false,
        })
    }

    pub fn is_dismissed(&self, session_id: &str) -> bool {
        self.state.sessions.contains_key(session_id)
    }

    pub fn dismiss(&mut self, session_id: &str) {
        self.state.sessions.insert(
            session_id.to_string(),
            DismissedEntry {
                dismissed_at: Utc::now(),
            },
        );
        self.dirty = true;
    }

    /// Bring a dismissed session back; returns whether it was dismissed
    pub fn restore(&mut self, session_id: &str) -> bool {
        let removed = self.state.sessions.remove(session_id).is_some();
        if removed {
            self.dirty = true;
        }
        removed
    }

    pub fn dismissed_at(&self, session_id: &str) -> Option<DateTime<Utc>> {
        self.state.sessions.get(session_id).map(|e| e.dismissed_at)
    }

    /// Copy of the current ids for one refresh cycle
    pub fn snapshot(&self) -> DismissedSet {
        self.state.sessions.keys().cloned().collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write state to disk via temp file and rename
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        let json = serde_json::to_string_pretty(&self.state)
            .context("Failed to serialize dismissed state")?;

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, json)
            .with_context(|| format!("Failed to write temp dismissed file: {:?}", temp_path))?;

        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to rename dismissed file: {:?}", self.path))?;

        self.dirty = false;
        Ok(())
    }
}
