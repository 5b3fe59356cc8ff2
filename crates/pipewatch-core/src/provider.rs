//! Status provider trait.
//!
//! A status provider answers questions about pipelines hosted elsewhere
//! (GitLab, in the shipped binary). Errors are transient: callers log them
//! and retry on the next tick.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;
use crate::pipeline::{Pipeline, PipelineSummary};

/// Window of a project-wide listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineQuery {
    /// Exclusive lower bound on the pipeline update time.
    pub updated_after: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the pipeline update time.
    pub updated_before: Option<DateTime<Utc>>,
    /// Only pipelines triggered by this user.
    pub username: Option<String>,
}

impl PipelineQuery {
    pub fn updated_since(since: DateTime<Utc>) -> Self {
        Self {
            updated_after: Some(since),
            ..Self::default()
        }
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.updated_before = Some(until);
        self
    }

    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username;
        self
    }
}

#[async_trait]
pub trait StatusProvider: Send + Sync {
    /// Name of this provider.
    fn name(&self) -> &'static str;

    /// Fetch the current state of one pipeline.
    async fn get_pipeline(&self, project: &str, pipeline_id: u64) -> Result<Pipeline>;

    /// List pipelines of a project touched within the query window.
    async fn list_pipelines(
        &self,
        project: &str,
        query: &PipelineQuery,
    ) -> Result<Vec<PipelineSummary>>;
}
