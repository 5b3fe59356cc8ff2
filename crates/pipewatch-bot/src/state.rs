//! Shared bot state.

use crate::services::GitLabClient;
use pipewatch_config::Settings;
use pipewatch_scheduler::{Dispatcher, Tracker};
use std::sync::Arc;

/// State shared by every message handler.
#[derive(Clone)]
pub struct BotState {
    pub settings: Arc<Settings>,
    pub gitlab: Arc<GitLabClient>,
    /// Replies go through the same rich-then-plain fallback as notifications.
    pub dispatcher: Arc<Dispatcher>,
    pub tracker: Arc<Tracker>,
}

impl BotState {
    pub fn new(
        settings: Settings,
        gitlab: Arc<GitLabClient>,
        dispatcher: Arc<Dispatcher>,
        tracker: Arc<Tracker>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            gitlab,
            dispatcher,
            tracker,
        }
    }
}
