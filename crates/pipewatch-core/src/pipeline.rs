//! Pipeline snapshots as reported by the status provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statuses after which a pipeline will not change again.
pub const TERMINAL_STATUSES: &[&str] = &["success", "failed", "canceled", "skipped"];

/// Full detail of a single pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline identifier within the provider.
    pub id: u64,
    /// Provider status string (e.g. "running", "success").
    pub status: String,
    /// Link to the pipeline page.
    pub web_url: String,
    /// Branch or tag the pipeline runs for.
    #[serde(rename = "ref", default)]
    pub ref_name: String,
    /// When the pipeline started running.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the pipeline finished.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Run time in seconds, absent while the pipeline has not run.
    #[serde(default)]
    pub duration: Option<u64>,
    /// Last time anything about the pipeline changed.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Pipeline {
    pub fn is_terminal(&self) -> bool {
        is_terminal_status(&self.status)
    }
}

/// A pipeline as it appears in a project listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub id: u64,
    pub status: String,
    #[serde(rename = "ref", default)]
    pub ref_name: String,
    #[serde(default)]
    pub web_url: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

pub fn is_terminal_status(status: &str) -> bool {
    TERMINAL_STATUSES.contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_gitlab_pipeline() {
        let json = r#"{
            "id": 12345,
            "iid": 7,
            "project_id": 3,
            "status": "running",
            "ref": "main",
            "sha": "abc",
            "web_url": "https://git.example.com/group/app/-/pipelines/12345",
            "started_at": "2024-05-01T10:00:00Z",
            "finished_at": null,
            "duration": null,
            "updated_at": "2024-05-01T10:01:00Z"
        }"#;

        let pipeline: Pipeline = serde_json::from_str(json).unwrap();
        assert_eq!(pipeline.id, 12345);
        assert_eq!(pipeline.ref_name, "main");
        assert!(pipeline.started_at.is_some());
        assert!(pipeline.finished_at.is_none());
        assert_eq!(pipeline.duration, None);
        assert!(!pipeline.is_terminal());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(is_terminal_status("success"));
        assert!(is_terminal_status("failed"));
        assert!(is_terminal_status("canceled"));
        assert!(!is_terminal_status("running"));
        assert!(!is_terminal_status("pending"));
    }
}
