//! Remote agent tasks reported by the hosted API.
//!
//! Fetching is a collaborator's job; this module only understands the JSON
//! it produces. `RemoteFeed` reads a cached copy of that JSON from disk.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::error::SourceError;
use crate::refresh::SessionFeed;
use crate::session::normalize::{from_remote, parse_timestamp};
use crate::session::{Provenance, Session};

/// One remote task record as returned by the API
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTask {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "optional_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "optional_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "optional_string")]
    pub repository: Option<String>,
    #[serde(default, deserialize_with = "optional_string")]
    pub branch: Option<String>,
    #[serde(default, deserialize_with = "optional_string")]
    pub pr_url: Option<String>,
    #[serde(default, deserialize_with = "optional_number")]
    pub pr_number: Option<u64>,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_string(deserializer)?.unwrap_or_default())
}

fn optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn optional_number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64().filter(|n| *n > 0),
        Some(Value::String(s)) => s.trim().parse().ok().filter(|n| *n > 0),
        _ => None,
    })
}

fn optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_string(deserializer)?.and_then(|s| parse_timestamp(&s)))
}

/// Parse a task list: either a bare array or an object wrapping the array
/// under `sessions`, `tasks` or `agentTasks`. Records that do not decode or
/// carry no id are skipped.
pub fn parse_task_list(json: &str) -> Result<Vec<AgentTask>, serde_json::Error> {
    let value: Value = serde_json::from_str(json)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => ["sessions", "tasks", "agentTasks"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<AgentTask>(item) {
            Ok(task) if !task.id.is_empty() => Some(task),
            Ok(_) => {
                debug!("skipping remote task without id");
                None
            }
            Err(e) => {
                debug!(error = %e, "skipping undecodable remote task");
                None
            }
        })
        .collect())
}

/// Remote feed backed by a JSON file written by the fetching collaborator
pub struct RemoteFeed {
    path: PathBuf,
}

impl RemoteFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionFeed for RemoteFeed {
    fn name(&self) -> &'static str {
        Provenance::AgentTask.as_str()
    }

    fn fetch(&self, now: DateTime<Utc>) -> Result<Vec<Session>, SourceError> {
        let json = fs::read_to_string(&self.path).map_err(|e| {
            SourceError::from_message(
                self.name(),
                format!("failed to read {}: {}", self.path.display(), e),
            )
        })?;

        // A collaborator may cache the CLI's error text instead of JSON
        let tasks = parse_task_list(&json)
            .map_err(|_| SourceError::from_message(self.name(), json.trim()))?;

        Ok(tasks.into_iter().map(|task| from_remote(task, now)).collect())
    }
}
