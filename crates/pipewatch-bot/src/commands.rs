//! Chat command parsing.
//!
//! Supported commands:
//! - `/pipeline <url>` or `/p <url>`, with a url like
//!   `https://git.example.com/group/project/-/pipelines/123`
//! - `/issue <url>` or `/i <url>`, with a url like
//!   `https://git.example.com/group/project/-/issues/7`
//!
//! Nested groups (`group/subgroup/project`) are accepted.

use derive_more::Display;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// What a command points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Target {
    #[display("pipeline")]
    Pipeline,
    #[display("issue")]
    Issue,
}

impl Target {
    /// Path segment of this target in a GitLab url.
    fn segment(self) -> &'static str {
        match self {
            Target::Pipeline => "pipelines",
            Target::Issue => "issues",
        }
    }

    fn usage(self) -> &'static str {
        match self {
            Target::Pipeline => {
                "/p[ipeline] https://yourgitlab.com/yourgroup/yourproject/-/pipelines/12345"
            }
            Target::Issue => "/i[ssue] https://yourgitlab.com/yourgroup/yourproject/-/issues/12345",
        }
    }
}

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub target: Target,
    /// Project path, e.g. `group/project`.
    pub project: String,
    /// Pipeline id or issue iid.
    pub id: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("you must send command in format {}", .0.usage())]
    Usage(Target),

    #[error("wrong {0} number")]
    WrongNumber(Target),

    #[error("I don't understand you")]
    Unknown,
}

/// Parse a chat message into a command.
pub fn parse(text: &str) -> Result<Command, CommandError> {
    let normalized = WHITESPACE.replace_all(text.trim(), " ");
    let mut parts = normalized.split(' ');

    let name = parts.next().unwrap_or_default();
    // Commands in group chats may be addressed as `/p@botname`.
    let name = name.split('@').next().unwrap_or_default();

    let target = match name {
        "/pipeline" | "/p" => Target::Pipeline,
        "/issue" | "/i" => Target::Issue,
        _ => return Err(CommandError::Unknown),
    };

    let url = parts.next().ok_or(CommandError::Usage(target))?;
    let (project, id) = parse_url(url, target)?;

    Ok(Command {
        target,
        project,
        id,
    })
}

fn parse_url(raw: &str, target: Target) -> Result<(String, u64), CommandError> {
    let url = Url::parse(raw).map_err(|_| CommandError::Usage(target))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(CommandError::Usage(target));
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    // <namespace...>/<project>/-/<target>/<id>
    let n = segments.len();
    if n < 5 || segments[n - 3] != "-" || segments[n - 2] != target.segment() {
        return Err(CommandError::Usage(target));
    }

    let id = segments[n - 1]
        .parse::<u64>()
        .map_err(|_| CommandError::WrongNumber(target))?;
    Ok((segments[..n - 3].join("/"), id))
}
