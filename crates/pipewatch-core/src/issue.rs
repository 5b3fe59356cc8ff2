//! Issue snapshots, used by the `/issue` command.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub iid: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// "opened" or "closed".
    pub state: String,
    pub web_url: String,
    #[serde(default)]
    pub author: Option<IssueUser>,
    #[serde(default)]
    pub assignee: Option<IssueUser>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueUser {
    pub username: String,
}
