//! Core domain types and traits for pipewatch.
//!
//! This crate contains:
//! - Pipeline and issue snapshots as reported by the status provider
//! - Watch definitions (key, mode, per-watch state)
//! - StatusProvider and NotificationSink traits
//! - Display formatting for notifications

pub mod error;
pub mod format;
pub mod issue;
pub mod notifier;
pub mod pipeline;
pub mod provider;
pub mod watch;

pub use error::{Error, Result};
pub use notifier::{MessageFormat, NotificationSink};
pub use provider::{PipelineQuery, StatusProvider};
pub use watch::{Watch, WatchKey, WatchMode};
