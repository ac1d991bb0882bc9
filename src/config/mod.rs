//! Configuration management for agentdeck.
//!
//! Handles loading and saving of source locations and the time thresholds
//! used by the aggregator.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::aggregate::Thresholds;
use crate::usage::DEFAULT_WINDOW_DAYS;

/// Main configuration struct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Filter applied when the view opens
    #[serde(default = "default_filter")]
    pub default_filter: String,

    /// Where sessions and logs are read from
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Attention, duplicate and usage windows
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
}

fn default_filter() -> String {
    "all".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_filter: default_filter(),
            sources: SourcesConfig::default(),
            thresholds: ThresholdsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from disk, or return default if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from an explicit path, or return default if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.thresholds.validate();

        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Directory holding the config file and dismissed-session state
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not find config directory")?;

        Ok(config_dir.join("agentdeck"))
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }
}

/// Source locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Directory of local workspace descriptors
    #[serde(default = "default_session_state_dir")]
    pub session_state_dir: PathBuf,

    /// Directory of CLI process logs scanned for token usage
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,

    /// Cached JSON of the remote task list; remote source disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_tasks_file: Option<PathBuf>,
}

fn copilot_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/"))
        .join(".copilot")
}

fn default_session_state_dir() -> PathBuf {
    copilot_dir().join("session-state")
}

fn default_logs_dir() -> PathBuf {
    copilot_dir().join("logs")
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            session_state_dir: default_session_state_dir(),
            logs_dir: default_logs_dir(),
            remote_tasks_file: None,
        }
    }
}

/// Time windows, in the units people think about them in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    /// Minutes an active session may stay quiet before needing attention
    #[serde(default = "default_stale_after")]
    pub stale_after_minutes: i64,

    /// Minutes an older duplicate may stay quiet before being demoted
    #[serde(default = "default_quiet_duplicate")]
    pub quiet_duplicate_minutes: i64,

    /// Days of logs scanned for token usage
    #[serde(default = "default_usage_window")]
    pub usage_window_days: i64,
}

fn default_stale_after() -> i64 {
    30
}

fn default_quiet_duplicate() -> i64 {
    60
}

fn default_usage_window() -> i64 {
    DEFAULT_WINDOW_DAYS
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            stale_after_minutes: default_stale_after(),
            quiet_duplicate_minutes: default_quiet_duplicate(),
            usage_window_days: default_usage_window(),
        }
    }
}

impl ThresholdsConfig {
    /// Clamp every window to a sane range
    pub fn validate(&mut self) {
        self.stale_after_minutes = self.stale_after_minutes.clamp(1, 7 * 24 * 60);
        self.quiet_duplicate_minutes = self.quiet_duplicate_minutes.clamp(1, 30 * 24 * 60);
        self.usage_window_days = self.usage_window_days.clamp(1, 90);
    }

    pub fn to_thresholds(&self) -> Thresholds {
        Thresholds {
            stale_after: Duration::minutes(self.stale_after_minutes),
            quiet_duplicate_after: Duration::minutes(self.quiet_duplicate_minutes),
        }
    }

    pub fn usage_window(&self) -> Duration {
        Duration::days(self.usage_window_days)
    }
}
