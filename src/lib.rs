//! agentdeck library crate.
//!
//! This library provides the session engine behind the agentdeck view:
//! - Status classification across differently-worded sources
//! - Tolerant parsing of local workspace descriptors
//! - Token usage recovery from CLI process logs
//! - Aggregation, filtering and ordering of remote and local sessions

pub mod aggregate;
pub mod config;
pub mod error;
pub mod local;
pub mod refresh;
pub mod remote;
pub mod session;
pub mod usage;
pub mod watcher;
