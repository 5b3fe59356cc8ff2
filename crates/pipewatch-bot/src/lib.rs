//! Telegram bot front end for pipewatch.
//!
//! Answers `/pipeline` and `/issue` commands with data from GitLab and
//! hands unfinished pipelines to the scheduler for tracking.

pub mod commands;
pub mod error;
pub mod handler;
pub mod poller;
pub mod services;
pub mod state;

pub use error::{BotError, BotResult};
pub use state::BotState;
