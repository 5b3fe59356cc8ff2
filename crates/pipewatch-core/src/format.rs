//! Human-readable rendering of pipelines, issues and watch outcomes.

use chrono::{DateTime, Utc};

use crate::issue::Issue;
use crate::pipeline::Pipeline;

/// Render a pipeline as a multi-line message body.
pub fn format_pipeline(pipeline: &Pipeline) -> String {
    let marker = match pipeline.status.as_str() {
        "running" => "🏃".to_string(),
        "success" => "✅".to_string(),
        "failed" => "❌".to_string(),
        "canceled" => "🚫".to_string(),
        other => format!("❓ {}", other),
    };

    format!(
        "{} {}\nref: {}\nstarted: {}\nfinished: {}\nduration: {}",
        marker,
        pipeline.web_url,
        pipeline.ref_name,
        format_time(pipeline.started_at, "not started"),
        format_time(pipeline.finished_at, "not finished"),
        format_duration(pipeline.duration.unwrap_or(0)),
    )
}

/// Render an issue as a multi-line message body.
pub fn format_issue(issue: &Issue) -> String {
    let marker = match issue.state.as_str() {
        "opened" => "🔓".to_string(),
        "closed" => "✅".to_string(),
        other => format!("❓ {}", other),
    };

    let author = issue
        .author
        .as_ref()
        .map(|u| u.username.as_str())
        .filter(|u| !u.is_empty())
        .unwrap_or("unknown author");
    let assignee = issue
        .assignee
        .as_ref()
        .map(|u| u.username.as_str())
        .filter(|u| !u.is_empty())
        .unwrap_or("nobody");

    format!(
        "{} {}\n{}\nAuthor: {}\nAssignee: {}\n{}",
        marker,
        issue.web_url,
        issue.title,
        author,
        assignee,
        issue.description.as_deref().unwrap_or_default(),
    )
}

/// Format seconds as `1h 2m 3s`, dropping leading zero units.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

fn format_time(time: Option<DateTime<Utc>>, missing: &str) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| missing.to_string())
}

pub fn status_changed_message(pipeline: &Pipeline) -> String {
    format!("**pipeline status changed**\n{}", format_pipeline(pipeline))
}

pub fn pipeline_updated_message(pipeline: &Pipeline) -> String {
    format!("**Pipeline updated**\n{}", format_pipeline(pipeline))
}

pub fn expired_message(pipeline_id: u64) -> String {
    format!(
        "**pipeline {} monitored too long**\ntask deleted, you can retry it",
        pipeline_id
    )
}
