//! Settings parsing.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Default delay between two ticks of a watch.
pub const DEFAULT_INTERVAL_SECS: u64 = 10;

/// Default number of ticks after which a single-pipeline watch expires.
pub const DEFAULT_EXPIRY_TICKS: u32 = 360;

/// Process-wide settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub telegram: TelegramSettings,
    pub gitlab: GitLabSettings,
    pub scheduler: SchedulerSettings,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelegramSettings {
    /// Bot API token.
    pub token: String,
    /// Chats allowed to talk to the bot.
    pub allowed_ids: Vec<i64>,
    /// Recipient of project-wide notifications.
    pub notify_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GitLabSettings {
    /// API base url, e.g. `https://git.example.com/api/v4`.
    pub url: String,
    pub token: String,
    pub username: Option<String>,
    /// Restrict project-wide watches to pipelines of `username`.
    pub track_only_self: bool,
    /// Accept invalid TLS certificates.
    pub insecure_tls: bool,
    /// Projects watched from startup.
    pub projects: Vec<String>,
}

impl Default for GitLabSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            username: None,
            track_only_self: true,
            insecure_tls: false,
            projects: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub interval_secs: u64,
    pub expiry_ticks: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            expiry_ticks: DEFAULT_EXPIRY_TICKS,
        }
    }
}

/// Values given on the command line or through the environment.
///
/// Lists are kept in their comma-separated form.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub telegram_token: Option<String>,
    pub allowed_ids: Option<String>,
    pub notify_id: Option<String>,
    pub gitlab_url: Option<String>,
    pub gitlab_token: Option<String>,
    pub gitlab_username: Option<String>,
    pub track_projects: Option<String>,
    pub track_only_self: Option<bool>,
    pub insecure_tls: Option<bool>,
}

impl Settings {
    /// Overlay command-line/environment values on top of file values.
    pub fn apply(mut self, overrides: SettingsOverrides) -> ConfigResult<Self> {
        if let Some(token) = overrides.telegram_token {
            self.telegram.token = token;
        }
        if let Some(ids) = overrides.allowed_ids {
            self.telegram.allowed_ids = parse_id_list("allowed ids", &ids)?;
        }
        if let Some(id) = overrides.notify_id {
            let id = id.trim();
            self.telegram.notify_id = if id.is_empty() {
                None
            } else {
                Some(parse_id("notify id", id)?)
            };
        }
        if let Some(url) = overrides.gitlab_url {
            self.gitlab.url = url;
        }
        if let Some(token) = overrides.gitlab_token {
            self.gitlab.token = token;
        }
        if let Some(username) = overrides.gitlab_username {
            self.gitlab.username = Some(username).filter(|u| !u.is_empty());
        }
        if let Some(projects) = overrides.track_projects {
            self.gitlab.projects = parse_list(&projects);
        }
        if let Some(only_self) = overrides.track_only_self {
            self.gitlab.track_only_self = only_self;
        }
        if let Some(insecure) = overrides.insecure_tls {
            self.gitlab.insecure_tls = insecure;
        }
        Ok(self)
    }

    /// Check that every required setting is present.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.telegram.token.is_empty() {
            return Err(ConfigError::MissingField("telegram token".to_string()));
        }
        if self.gitlab.token.is_empty() {
            return Err(ConfigError::MissingField("gitlab token".to_string()));
        }
        if self.gitlab.url.is_empty() {
            return Err(ConfigError::MissingField("gitlab url".to_string()));
        }
        if self.telegram.allowed_ids.is_empty() {
            return Err(ConfigError::MissingField("allowed ids".to_string()));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduler interval-secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Whether a chat may use the bot.
    pub fn is_allowed(&self, chat_id: i64) -> bool {
        self.telegram.allowed_ids.contains(&chat_id)
    }

    /// Username filter for project-wide watches, if any.
    pub fn username_filter(&self) -> Option<String> {
        if self.gitlab.track_only_self {
            self.gitlab.username.clone().filter(|u| !u.is_empty())
        } else {
            None
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.interval_secs)
    }
}

/// Load settings from a file.
///
/// A missing file yields default settings unless `required` is set.
pub fn load_settings(path: &Path, required: bool) -> ConfigResult<Settings> {
    if !required && !path.exists() {
        info!(path = %path.display(), "No settings file, using flags and environment only");
        return Ok(Settings::default());
    }

    let content = std::fs::read_to_string(path)?;
    parse_settings(&content)
}

/// Parse settings from KDL text.
pub fn parse_settings(kdl: &str) -> ConfigResult<Settings> {
    let doc: KdlDocument = kdl.parse()?;
    let mut settings = Settings::default();

    for node in doc.nodes() {
        match node.name().value() {
            "telegram" => parse_telegram(node, &mut settings.telegram)?,
            "gitlab" => parse_gitlab(node, &mut settings.gitlab)?,
            "scheduler" => parse_scheduler(node, &mut settings.scheduler)?,
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(settings)
}

fn parse_telegram(node: &KdlNode, telegram: &mut TelegramSettings) -> ConfigResult<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        match child.name().value() {
            "token" => {
                telegram.token = get_first_string_arg(child).unwrap_or_default();
            }
            "allowed-ids" | "allowed_ids" => {
                telegram.allowed_ids = get_all_id_args(child, "allowed ids")?;
            }
            "notify-id" | "notify_id" => {
                telegram.notify_id = get_all_id_args(child, "notify id")?.first().copied();
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_gitlab(node: &KdlNode, gitlab: &mut GitLabSettings) -> ConfigResult<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        match child.name().value() {
            "url" => {
                gitlab.url = get_first_string_arg(child).unwrap_or_default();
            }
            "token" => {
                gitlab.token = get_first_string_arg(child).unwrap_or_default();
            }
            "username" => {
                gitlab.username = get_first_string_arg(child).filter(|u| !u.is_empty());
            }
            "track-only-self" | "track_only_self" => {
                gitlab.track_only_self = get_first_bool_arg(child, "track-only-self")?;
            }
            "insecure-tls" | "insecure_tls" => {
                gitlab.insecure_tls = get_first_bool_arg(child, "insecure-tls")?;
            }
            "projects" => {
                gitlab.projects = get_all_string_args(child);
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_scheduler(node: &KdlNode, scheduler: &mut SchedulerSettings) -> ConfigResult<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        match child.name().value() {
            "interval-secs" | "interval_secs" => {
                scheduler.interval_secs = get_first_uint_arg(child, "interval-secs")?;
            }
            "expiry-ticks" | "expiry_ticks" => {
                let ticks = get_first_uint_arg(child, "expiry-ticks")?;
                scheduler.expiry_ticks =
                    u32::try_from(ticks).map_err(|_| ConfigError::InvalidValue {
                        field: "expiry-ticks".to_string(),
                        message: format!("{} is too large", ticks),
                    })?;
            }
            _ => {}
        }
    }
    Ok(())
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_first_bool_arg(node: &KdlNode, field: &str) -> ConfigResult<bool> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
        .ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: "expected #true or #false".to_string(),
        })
}

fn get_first_uint_arg(node: &KdlNode, field: &str) -> ConfigResult<u64> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
        .and_then(|i| u64::try_from(i).ok())
        .ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: "expected a positive integer".to_string(),
        })
}

/// Chat ids may be written as integers or strings.
fn get_all_id_args(node: &KdlNode, field: &str) -> ConfigResult<Vec<i64>> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| match e.value() {
            KdlValue::Integer(i) => i64::try_from(*i).map_err(|_| ConfigError::InvalidValue {
                field: field.to_string(),
                message: format!("{} is out of range", i),
            }),
            KdlValue::String(s) => parse_id(field, s),
            other => Err(ConfigError::InvalidValue {
                field: field.to_string(),
                message: format!("unexpected value {}", other),
            }),
        })
        .collect()
}

fn parse_id(field: &str, value: &str) -> ConfigResult<i64> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("'{}' is not a chat id", value),
        })
}

fn parse_id_list(field: &str, value: &str) -> ConfigResult<Vec<i64>> {
    parse_list(value)
        .iter()
        .map(|id| parse_id(field, id))
        .collect()
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
