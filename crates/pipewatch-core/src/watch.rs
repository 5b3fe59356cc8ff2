//! Watch definitions.
//!
//! A watch is one tracked pipeline or project. Its key is derived from the
//! recipient and the target so that re-issuing the same watch replaces the
//! previous one instead of duplicating it.

use chrono::{DateTime, Utc};
use derive_more::Display;

/// Unique identity of a watch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("{_0}")]
pub struct WatchKey(String);

impl WatchKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key of a single-pipeline watch.
    pub fn for_pipeline(recipient: i64, project: &str, pipeline_id: u64) -> Self {
        Self(format!("{recipient}/{project}/pipelines/{pipeline_id}"))
    }

    /// Key of a project-wide watch.
    pub fn for_project(recipient: i64, project: &str) -> Self {
        Self(format!("{recipient}/{project}/pipelines"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// What a watch tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchMode {
    /// Exactly one pipeline, until its status changes or the watch expires.
    SinglePipeline { pipeline_id: u64 },
    /// Every pipeline of the project updated since the last check.
    ProjectWide {
        /// Only report pipelines triggered by this user.
        username: Option<String>,
    },
}

/// The unit of tracked work.
#[derive(Debug, Clone, PartialEq)]
pub struct Watch {
    pub key: WatchKey,
    /// Chat to notify.
    pub recipient: i64,
    /// Project path in owner/name form.
    pub project: String,
    pub mode: WatchMode,
    /// Last observed status, empty until known.
    pub last_known_status: String,
    /// Lower bound of the next project-wide query. `None` means the watch
    /// has never checked and only looks forward from now.
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Ticks this watch has survived.
    pub tick_count: u32,
}

impl Watch {
    /// Create a single-pipeline watch with a derived key.
    pub fn single_pipeline(
        recipient: i64,
        project: impl Into<String>,
        pipeline_id: u64,
        status: impl Into<String>,
    ) -> Self {
        let project = project.into();
        Self {
            key: WatchKey::for_pipeline(recipient, &project, pipeline_id),
            recipient,
            project,
            mode: WatchMode::SinglePipeline { pipeline_id },
            last_known_status: status.into(),
            last_checked_at: None,
            tick_count: 0,
        }
    }

    /// Create a project-wide watch with a derived key.
    pub fn project_wide(
        recipient: i64,
        project: impl Into<String>,
        username: Option<String>,
    ) -> Self {
        let project = project.into();
        Self {
            key: WatchKey::for_project(recipient, &project),
            recipient,
            project,
            mode: WatchMode::ProjectWide { username },
            last_known_status: String::new(),
            last_checked_at: None,
            tick_count: 0,
        }
    }

    /// Replace the derived key.
    pub fn with_key(mut self, key: WatchKey) -> Self {
        self.key = key;
        self
    }

    pub fn pipeline_id(&self) -> Option<u64> {
        match self.mode {
            WatchMode::SinglePipeline { pipeline_id } => Some(pipeline_id),
            WatchMode::ProjectWide { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_deterministic() {
        let a = Watch::single_pipeline(42, "group/app", 12345, "running");
        let b = Watch::single_pipeline(42, "group/app", 12345, "pending");
        assert_eq!(a.key, b.key);

        let other_recipient = Watch::single_pipeline(43, "group/app", 12345, "running");
        assert_ne!(a.key, other_recipient.key);

        let project = Watch::project_wide(42, "group/app", None);
        assert_ne!(a.key, project.key);
        assert_eq!(project.key, WatchKey::for_project(42, "group/app"));
    }

    #[test]
    fn test_new_watch_state() {
        let watch = Watch::single_pipeline(42, "group/app", 12345, "running");
        assert_eq!(watch.tick_count, 0);
        assert_eq!(watch.last_known_status, "running");
        assert!(watch.last_checked_at.is_none());
        assert_eq!(watch.pipeline_id(), Some(12345));

        let project = Watch::project_wide(42, "group/app", Some("alice".to_string()));
        assert_eq!(project.pipeline_id(), None);
        assert!(project.last_known_status.is_empty());
    }

    #[test]
    fn test_key_display() {
        let key = WatchKey::for_pipeline(42, "group/app", 7);
        assert_eq!(key.to_string(), "42/group/app/pipelines/7");
        assert_eq!(key.as_str(), "42/group/app/pipelines/7");
    }
}
