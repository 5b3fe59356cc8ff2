//! KDL configuration parsing for pipewatch.
//!
//! Settings come from an optional `pipewatch.kdl` file and are then
//! overridden by command-line flags or environment variables.

pub mod error;
pub mod settings;

pub use error::{ConfigError, ConfigResult};
pub use settings::{
    GitLabSettings, SchedulerSettings, Settings, SettingsOverrides, TelegramSettings,
    load_settings, parse_settings,
};
