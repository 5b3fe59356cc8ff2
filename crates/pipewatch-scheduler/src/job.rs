//! Per-tick watch execution.
//!
//! Every tick bumps the watch's tick counter, expires single-pipeline
//! watches that have been unchanged for too long, and otherwise hands the
//! status check to a detached task. The tick never waits for that task.
//! The task talks to the outside world only through the dispatcher and the
//! scheduler, so a slow or panicking provider call stays contained in it.
//! While a check is still running, later ticks of the same watch count
//! towards expiry but start no new check.

use crate::dispatcher::Dispatcher;
use crate::registry::Scheduler;
use crate::ticker::{TickJob, panic_message};
use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use pipewatch_core::format::{expired_message, pipeline_updated_message, status_changed_message};
use pipewatch_core::{PipelineQuery, StatusProvider, Watch, WatchKey, WatchMode};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What the detached task of one tick checks.
#[derive(Debug, Clone, PartialEq)]
enum Check {
    Pipeline {
        pipeline_id: u64,
        last_known_status: String,
    },
    Project {
        query: PipelineQuery,
    },
}

/// Everything the detached task needs, owned.
struct CheckContext {
    key: WatchKey,
    recipient: i64,
    project: String,
    provider: Arc<dyn StatusProvider>,
    dispatcher: Arc<Dispatcher>,
    scheduler: Arc<Scheduler>,
    generation: u64,
}

/// A watch bound to the scheduler that owns it.
pub struct WatchJob {
    watch: Watch,
    scheduler: Arc<Scheduler>,
    generation: u64,
    in_flight: Option<JoinHandle<()>>,
}

impl WatchJob {
    /// `generation` identifies the registration this job belongs to; see
    /// [`Scheduler::add`].
    pub fn new(watch: Watch, scheduler: Arc<Scheduler>, generation: u64) -> Self {
        Self {
            watch,
            scheduler,
            generation,
            in_flight: None,
        }
    }

    /// Run one tick. Returns once the status check is started, not finished.
    pub async fn run_tick(&mut self) {
        self.watch.tick_count += 1;

        if let WatchMode::SinglePipeline { pipeline_id } = self.watch.mode {
            if self.watch.tick_count > self.scheduler.config().expiry_ticks {
                self.expire(pipeline_id).await;
                return;
            }
        }

        if self.in_flight.as_ref().is_some_and(|unit| !unit.is_finished()) {
            debug!(
                key = %self.watch.key,
                tick = self.watch.tick_count,
                "Previous status check still running, skipping"
            );
            return;
        }

        let check = match &self.watch.mode {
            WatchMode::SinglePipeline { pipeline_id } => Check::Pipeline {
                pipeline_id: *pipeline_id,
                last_known_status: self.watch.last_known_status.clone(),
            },
            WatchMode::ProjectWide { username } => {
                let now = Utc::now();
                let since = self.watch.last_checked_at.unwrap_or(now);
                // Never move the checkpoint backwards, even if the clock does.
                let until = now.max(since);
                self.watch.last_checked_at = Some(until);
                Check::Project {
                    query: PipelineQuery::updated_since(since)
                        .until(until)
                        .with_username(username.clone()),
                }
            }
        };

        debug!(key = %self.watch.key, tick = self.watch.tick_count, "Watch tick");

        let ctx = CheckContext {
            key: self.watch.key.clone(),
            recipient: self.watch.recipient,
            project: self.watch.project.clone(),
            provider: Arc::clone(self.scheduler.provider()),
            dispatcher: Arc::clone(self.scheduler.dispatcher()),
            scheduler: Arc::clone(&self.scheduler),
            generation: self.generation,
        };

        let key = self.watch.key.clone();
        self.in_flight = Some(tokio::spawn(async move {
            if let Err(panic) = AssertUnwindSafe(run_check(ctx, check)).catch_unwind().await {
                error!(key = %key, panic = %panic_message(panic.as_ref()), "Status check panicked");
            }
        }));
    }

    async fn expire(&self, pipeline_id: u64) {
        info!(
            key = %self.watch.key,
            ticks = self.watch.tick_count,
            "Watch expired"
        );

        if let Err(e) = self
            .scheduler
            .dispatcher()
            .send(self.watch.recipient, &expired_message(pipeline_id))
            .await
        {
            warn!(key = %self.watch.key, error = %e, "Failed to send expiry notice");
        }

        // Cancels this very registration, so nothing may be awaited after it.
        self.scheduler.retire(&self.watch.key, self.generation);
    }
}

#[async_trait]
impl TickJob for WatchJob {
    fn label(&self) -> String {
        self.watch.key.to_string()
    }

    async fn tick(&mut self) {
        self.run_tick().await;
    }
}

async fn run_check(ctx: CheckContext, check: Check) {
    match check {
        Check::Pipeline {
            pipeline_id,
            last_known_status,
        } => check_pipeline(&ctx, pipeline_id, &last_known_status).await,
        Check::Project { query } => check_project(&ctx, &query).await,
    }
}

/// A changed status is reported once and ends the watch.
async fn check_pipeline(ctx: &CheckContext, pipeline_id: u64, last_known_status: &str) {
    let pipeline = match ctx.provider.get_pipeline(&ctx.project, pipeline_id).await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            warn!(
                key = %ctx.key,
                provider = ctx.provider.name(),
                error = %e,
                "Failed to get pipeline, retrying next tick"
            );
            return;
        }
    };

    if pipeline.status == last_known_status {
        debug!(key = %ctx.key, status = %pipeline.status, "Pipeline unchanged");
        return;
    }

    info!(
        key = %ctx.key,
        from = %last_known_status,
        to = %pipeline.status,
        "Pipeline status changed"
    );

    if let Err(e) = ctx
        .dispatcher
        .send(ctx.recipient, &status_changed_message(&pipeline))
        .await
    {
        warn!(key = %ctx.key, error = %e, "Failed to send status change");
    }

    ctx.scheduler.retire(&ctx.key, ctx.generation);
}

async fn check_project(ctx: &CheckContext, query: &PipelineQuery) {
    let summaries = match ctx.provider.list_pipelines(&ctx.project, query).await {
        Ok(summaries) => summaries,
        Err(e) => {
            warn!(
                key = %ctx.key,
                provider = ctx.provider.name(),
                error = %e,
                "Failed to list pipelines"
            );
            return;
        }
    };

    if !summaries.is_empty() {
        debug!(key = %ctx.key, count = summaries.len(), "Pipelines updated");
    }

    for (idx, summary) in summaries.iter().enumerate() {
        // One failed fetch drops the rest of this window.
        let pipeline = match ctx.provider.get_pipeline(&ctx.project, summary.id).await {
            Ok(pipeline) => pipeline,
            Err(e) => {
                warn!(
                    key = %ctx.key,
                    pipeline_id = summary.id,
                    skipped = summaries.len() - idx,
                    error = %e,
                    "Failed to get pipeline, abandoning this tick"
                );
                return;
            }
        };

        if let Err(e) = ctx
            .dispatcher
            .send(ctx.recipient, &pipeline_updated_message(&pipeline))
            .await
        {
            warn!(key = %ctx.key, pipeline_id = summary.id, error = %e, "Failed to send update");
        }
    }
}
