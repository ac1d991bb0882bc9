//! One refresh cycle across every configured source.
//!
//! Each feed and the usage scan run on their own scoped thread; the
//! aggregator only starts once all of them have reported.

use std::path::PathBuf;
use std::thread;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::aggregate::{Aggregator, DismissedSet, Snapshot, StatusFilter, Thresholds};
use crate::config::Config;
use crate::error::{AggregateError, SourceError};
use crate::local::LocalFeed;
use crate::remote::RemoteFeed;
use crate::session::Session;
use crate::usage::{scan_log_dir, UsageMap, DEFAULT_WINDOW_DAYS};

/// A producer of normalized sessions
pub trait SessionFeed: Send + Sync {
    /// Source name used in warnings and logs
    fn name(&self) -> &'static str;

    fn fetch(&self, now: DateTime<Utc>) -> Result<Vec<Session>, SourceError>;
}

pub struct Refresher {
    feeds: Vec<Box<dyn SessionFeed>>,
    logs_dir: Option<PathBuf>,
    usage_window: Duration,
    aggregator: Aggregator,
}

impl Refresher {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            feeds: Vec::new(),
            logs_dir: None,
            usage_window: Duration::days(DEFAULT_WINDOW_DAYS),
            aggregator: Aggregator::new(thresholds),
        }
    }

    /// Local feed always; remote feed only when a task file is configured
    pub fn from_config(config: &Config) -> Self {
        let mut refresher = Self::new(config.thresholds.to_thresholds())
            .with_feed(LocalFeed::new(&config.sources.session_state_dir))
            .with_logs(&config.sources.logs_dir, config.thresholds.usage_window());

        if let Some(path) = &config.sources.remote_tasks_file {
            refresher = refresher.with_feed(RemoteFeed::new(path));
        }
        refresher
    }

    pub fn with_feed(mut self, feed: impl SessionFeed + 'static) -> Self {
        self.feeds.push(Box::new(feed));
        self
    }

    pub fn with_logs(mut self, dir: impl Into<PathBuf>, window: Duration) -> Self {
        self.logs_dir = Some(dir.into());
        self.usage_window = window;
        self
    }

    pub fn feed_names(&self) -> Vec<&'static str> {
        self.feeds.iter().map(|f| f.name()).collect()
    }

    pub fn refresh(
        &self,
        dismissed: &DismissedSet,
        filter: StatusFilter,
        now: DateTime<Utc>,
    ) -> Result<Snapshot, AggregateError> {
        let (batches, usage) = thread::scope(|scope| {
            let usage_handle = self
                .logs_dir
                .as_deref()
                .map(|dir| scope.spawn(move || scan_log_dir(dir, self.usage_window, now)));

            let handles: Vec<_> = self
                .feeds
                .iter()
                .map(|feed| (feed.name(), scope.spawn(move || feed.fetch(now))))
                .collect();

            let batches: Vec<_> = handles
                .into_iter()
                .map(|(name, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        Err(SourceError::Failed {
                            source_name: name.to_string(),
                            message: "source panicked".to_string(),
                        })
                    })
                })
                .collect();

            let usage = match usage_handle.map(|h| h.join()) {
                None => UsageMap::new(),
                Some(Ok(Ok(usage))) => usage,
                Some(Ok(Err(e))) => {
                    warn!(error = %e, "usage scan failed");
                    UsageMap::new()
                }
                Some(Err(_)) => {
                    warn!("usage scan panicked");
                    UsageMap::new()
                }
            };

            (batches, usage)
        });

        debug!(
            feeds = batches.len(),
            usage_sessions = usage.len(),
            "sources collected"
        );

        self.aggregator
            .aggregate(batches, dismissed, &usage, filter, now)
    }
}
