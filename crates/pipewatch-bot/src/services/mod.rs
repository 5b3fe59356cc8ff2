//! Clients for the external services the bot talks to.

pub mod gitlab;
pub mod telegram;

pub use gitlab::{GitLabClient, GitLabError};
pub use telegram::{TelegramClient, TelegramError};
