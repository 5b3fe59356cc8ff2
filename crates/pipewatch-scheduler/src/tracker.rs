//! Entry points used by the rest of the process to create watches.
//!
//! The command handler can be constructed before the scheduler exists, so
//! the tracker holds the scheduler as an optional late-bound reference.

use crate::registry::Scheduler;
use pipewatch_core::{Watch, WatchKey};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

#[derive(Default)]
pub struct Tracker {
    scheduler: RwLock<Option<Arc<Scheduler>>>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scheduler(scheduler: Arc<Scheduler>) -> Self {
        Self {
            scheduler: RwLock::new(Some(scheduler)),
        }
    }

    pub fn set_scheduler(&self, scheduler: Arc<Scheduler>) {
        *self
            .scheduler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(scheduler);
    }

    pub fn is_wired(&self) -> bool {
        self.scheduler().is_some()
    }

    /// Start watching one pipeline until its status moves away from
    /// `initial_status`. Returns false, and does nothing, when no scheduler
    /// has been wired yet.
    pub fn start_watch(
        &self,
        recipient: i64,
        pipeline_id: u64,
        key: WatchKey,
        project: &str,
        initial_status: &str,
    ) -> bool {
        let Some(scheduler) = self.scheduler() else {
            warn!(key = %key, "Scheduler not wired, watch dropped");
            return false;
        };

        let watch =
            Watch::single_pipeline(recipient, project, pipeline_id, initial_status).with_key(key);
        scheduler.add(watch);
        true
    }

    /// Create one project-wide watch per project. Returns the number of
    /// watches created.
    pub fn seed_projects(
        &self,
        projects: &[String],
        recipient: Option<i64>,
        username: Option<String>,
    ) -> usize {
        if projects.is_empty() {
            return 0;
        }

        let recipient = match recipient {
            Some(id) if id != 0 => id,
            _ => {
                warn!(
                    projects = projects.len(),
                    "No notification recipient configured, project tracking disabled"
                );
                return 0;
            }
        };

        let Some(scheduler) = self.scheduler() else {
            warn!("Scheduler not wired, project tracking disabled");
            return 0;
        };

        for project in projects {
            scheduler.add(Watch::project_wide(recipient, project, username.clone()));
            info!(project = %project, recipient, "Tracking project");
        }
        projects.len()
    }

    fn scheduler(&self) -> Option<Arc<Scheduler>> {
        self.scheduler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
