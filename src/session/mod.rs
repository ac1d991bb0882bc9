//! Canonical session model shared by every source.

pub mod normalize;
pub mod status;
pub mod types;

pub use status::classify;
pub use types::{Provenance, Session, SessionStatus, TokenUsage};
