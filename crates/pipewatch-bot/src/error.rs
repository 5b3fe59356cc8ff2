//! Bot error handling.

use crate::services::TelegramError;
use pipewatch_scheduler::DispatchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("Telegram: {0}")]
    Telegram(#[from] TelegramError),

    #[error("reply failed: {0}")]
    Reply(#[from] DispatchError),
}

pub type BotResult<T> = std::result::Result<T, BotError>;
