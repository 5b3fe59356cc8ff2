//! Chat message handling.

use crate::commands::{self, Command, Target};
use crate::error::BotResult;
use crate::services::GitLabError;
use crate::services::telegram::Update;
use crate::state::BotState;
use pipewatch_core::WatchKey;
use pipewatch_core::format::{format_issue, format_pipeline};
use tracing::{debug, info, warn};

pub const QUEUED_NOTICE: &str =
    "added to check queue, you will be notified when pipeline status will be changed";

/// Handle one Telegram update. Updates without a text message are ignored.
pub async fn handle_update(state: &BotState, update: &Update) -> BotResult<()> {
    let Some(message) = update.message() else {
        debug!(update_id = update.update_id, "Ignoring update without message");
        return Ok(());
    };
    let text = message.text.as_deref().unwrap_or_default();
    handle_message(state, message.chat.id, text).await
}

/// Answer a chat message.
pub async fn handle_message(state: &BotState, chat_id: i64, text: &str) -> BotResult<()> {
    if chat_id == 0 || text.is_empty() {
        return Ok(());
    }

    let reply = if state.settings.is_allowed(chat_id) {
        respond(state, chat_id, text).await
    } else {
        warn!(chat_id, "Message from chat outside the allow-list");
        format!("you are not allowed to use this bot, your id: {}", chat_id)
    };

    state.dispatcher.send(chat_id, &reply).await?;
    Ok(())
}

/// Build the reply to a message from an allowed chat.
pub async fn respond(state: &BotState, chat_id: i64, text: &str) -> String {
    let command = match commands::parse(text) {
        Ok(command) => command,
        Err(e) => return e.to_string(),
    };

    info!(
        chat_id,
        target = %command.target,
        project = %command.project,
        id = command.id,
        "Command received"
    );

    let result = match command.target {
        Target::Pipeline => describe_pipeline(state, chat_id, &command).await,
        Target::Issue => describe_issue(state, &command).await,
    };

    result.unwrap_or_else(|e| {
        warn!(project = %command.project, id = command.id, error = %e, "GitLab lookup failed");
        e.to_string()
    })
}

async fn describe_pipeline(
    state: &BotState,
    chat_id: i64,
    command: &Command,
) -> Result<String, GitLabError> {
    let pipeline = state.gitlab.pipeline(&command.project, command.id).await?;
    let mut text = format_pipeline(&pipeline);

    if !pipeline.is_terminal() {
        let key = WatchKey::for_pipeline(chat_id, &command.project, pipeline.id);
        let queued = state.tracker.start_watch(
            chat_id,
            pipeline.id,
            key,
            &command.project,
            &pipeline.status,
        );
        if queued {
            text.push_str("\n\n");
            text.push_str(QUEUED_NOTICE);
        }
    }

    Ok(text)
}

async fn describe_issue(state: &BotState, command: &Command) -> Result<String, GitLabError> {
    let issue = state.gitlab.issue(&command.project, command.id).await?;
    Ok(format_issue(&issue))
}
