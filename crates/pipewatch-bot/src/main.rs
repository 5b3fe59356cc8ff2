//! pipewatch: GitLab pipeline watcher with Telegram notifications.

use anyhow::Context;
use clap::Parser;
use clap::builder::BoolishValueParser;
use pipewatch_bot::BotState;
use pipewatch_bot::poller;
use pipewatch_bot::services::{GitLabClient, TelegramClient};
use pipewatch_config::{SettingsOverrides, load_settings};
use pipewatch_scheduler::{Dispatcher, Scheduler, SchedulerConfig, Tracker};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "pipewatch.kdl";

#[derive(Parser)]
#[command(name = "pipewatch")]
#[command(about = "Watch GitLab pipelines and report them to Telegram", long_about = None)]
struct Cli {
    /// Settings file [default: pipewatch.kdl]
    #[arg(long, env = "PIPEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Telegram bot token
    #[arg(long, env = "TELEGRAM_TOKEN", hide_env_values = true)]
    telegram_token: Option<String>,

    /// Comma-separated chat ids allowed to use the bot
    #[arg(long, env = "ALLOWED_IDS")]
    allowed_ids: Option<String>,

    /// Chat notified about tracked projects
    #[arg(long, env = "NOTIFY_TELEGRAM_ID")]
    notify_telegram_id: Option<String>,

    /// GitLab API token
    #[arg(long, env = "GITLAB_TOKEN", hide_env_values = true)]
    gitlab_token: Option<String>,

    /// GitLab API url, e.g. https://git.example.com/api/v4
    #[arg(long, env = "GITLAB_URL")]
    gitlab_url: Option<String>,

    /// GitLab username used to filter tracked projects
    #[arg(long, env = "GITLAB_USERNAME")]
    gitlab_username: Option<String>,

    /// Comma-separated projects to track
    #[arg(long, env = "GITLAB_TRACK_PROJECTS")]
    gitlab_track_projects: Option<String>,

    /// Only report tracked-project pipelines started by the GitLab username
    #[arg(long, env = "GITLAB_TRACK_ONLY_SELF", value_parser = BoolishValueParser::new())]
    gitlab_track_only_self: Option<bool>,

    /// Accept invalid TLS certificates from GitLab
    #[arg(long, env = "GITLAB_INSECURE_TLS", value_parser = BoolishValueParser::new())]
    gitlab_insecure_tls: Option<bool>,
}

impl Cli {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            telegram_token: self.telegram_token.clone(),
            allowed_ids: self.allowed_ids.clone(),
            notify_id: self.notify_telegram_id.clone(),
            gitlab_url: self.gitlab_url.clone(),
            gitlab_token: self.gitlab_token.clone(),
            gitlab_username: self.gitlab_username.clone(),
            track_projects: self.gitlab_track_projects.clone(),
            track_only_self: self.gitlab_track_only_self,
            insecure_tls: self.gitlab_insecure_tls,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Load settings
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let settings = load_settings(&path, cli.config.is_some())
        .with_context(|| format!("Failed to load settings from {}", path.display()))?
        .apply(cli.overrides())
        .context("Invalid command-line settings")?;
    settings.validate().context("Incomplete settings")?;

    // External services
    let gitlab = Arc::new(
        GitLabClient::new(
            settings.gitlab.url.clone(),
            settings.gitlab.token.clone(),
            settings.gitlab.insecure_tls,
        )
        .context("Failed to create GitLab client")?,
    );
    let telegram = Arc::new(TelegramClient::new(settings.telegram.token.clone()));

    // Scheduling
    let dispatcher = Arc::new(Dispatcher::new(telegram.clone()));
    let scheduler = Scheduler::new(
        gitlab.clone(),
        dispatcher.clone(),
        SchedulerConfig::from(&settings.scheduler),
    );
    let tracker = Arc::new(Tracker::with_scheduler(scheduler.clone()));

    info!(
        interval_secs = settings.tick_interval().as_secs(),
        expiry_ticks = settings.scheduler.expiry_ticks,
        "Scheduler ready"
    );

    tracker.seed_projects(
        &settings.gitlab.projects,
        settings.telegram.notify_id,
        settings.username_filter(),
    );

    let state = BotState::new(settings, gitlab, dispatcher, tracker);

    tokio::select! {
        _ = poller::run(state, telegram) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutting down");
        }
    }

    scheduler.shutdown();
    Ok(())
}
