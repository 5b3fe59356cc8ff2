//! GitLab REST API client for pipeline and issue lookups.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use pipewatch_core::issue::Issue;
use pipewatch_core::pipeline::{Pipeline, PipelineSummary};
use pipewatch_core::{PipelineQuery, StatusProvider};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Page size of project pipeline listings.
const PER_PAGE: u32 = 100;

/// Upper bound of one API call, connection included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// GitLab API v4 client.
pub struct GitLabClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    timeout: Duration,
}

impl GitLabClient {
    /// `base_url` is the API root, e.g. `https://git.example.com/api/v4`.
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        insecure_tls: bool,
    ) -> Result<Self, GitLabError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure_tls)
            .build()
            .map_err(|e| GitLabError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            timeout: REQUEST_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn project_url(&self, project: &str) -> String {
        format!(
            "{}/projects/{}",
            self.base_url,
            urlencoding::encode(project)
        )
    }

    /// Get a single pipeline.
    pub async fn pipeline(&self, project: &str, pipeline_id: u64) -> Result<Pipeline, GitLabError> {
        let url = format!("{}/pipelines/{}", self.project_url(project), pipeline_id);
        self.get(&url, &[]).await
    }

    /// List pipelines of a project updated within the query window, oldest first.
    pub async fn pipelines(
        &self,
        project: &str,
        query: &PipelineQuery,
    ) -> Result<Vec<PipelineSummary>, GitLabError> {
        let url = format!("{}/pipelines", self.project_url(project));

        let mut params = vec![
            ("order_by", "updated_at".to_string()),
            ("sort", "asc".to_string()),
            ("per_page", PER_PAGE.to_string()),
        ];
        // GitLab treats both bounds as inclusive. Moving the lower bound one
        // tick up keeps consecutive windows from sharing their boundary.
        if let Some(after) = query.updated_after {
            params.push(("updated_after", timestamp(after + TimeDelta::microseconds(1))));
        }
        if let Some(before) = query.updated_before {
            params.push(("updated_before", timestamp(before)));
        }
        if let Some(username) = &query.username {
            params.push(("username", username.clone()));
        }

        self.get(&url, &params).await
    }

    /// Get a single issue by its project-local id.
    pub async fn issue(&self, project: &str, iid: u64) -> Result<Issue, GitLabError> {
        let url = format!("{}/issues/{}", self.project_url(project), iid);
        self.get(&url, &[]).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, GitLabError> {
        debug!(url = %url, "GitLab request");

        let response = self
            .client
            .get(url)
            .header("PRIVATE-TOKEN", &self.token)
            .header("Accept", "application/json")
            .query(params)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| GitLabError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GitLabError::Api(error_message(status, &text)));
        }

        response
            .json()
            .await
            .map_err(|e| GitLabError::Parse(e.to_string()))
    }
}

#[async_trait]
impl StatusProvider for GitLabClient {
    fn name(&self) -> &'static str {
        "gitlab"
    }

    async fn get_pipeline(&self, project: &str, pipeline_id: u64) -> pipewatch_core::Result<Pipeline> {
        Ok(self.pipeline(project, pipeline_id).await?)
    }

    async fn list_pipelines(
        &self,
        project: &str,
        query: &PipelineQuery,
    ) -> pipewatch_core::Result<Vec<PipelineSummary>> {
        Ok(self.pipelines(project, query).await?)
    }
}

fn timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// GitLab reports errors as `{"message": ...}` where the message is either a
/// string or an object of field errors.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("message").cloned())
        .map(|message| match message {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });

    match message {
        Some(message) => message,
        None if body.is_empty() => status.to_string(),
        None => format!("{}: {}", status, body),
    }
}

/// GitLab API errors.
#[derive(Debug, thiserror::Error)]
pub enum GitLabError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("{0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<GitLabError> for pipewatch_core::Error {
    fn from(err: GitLabError) -> Self {
        pipewatch_core::Error::Provider(err.to_string())
    }
}
