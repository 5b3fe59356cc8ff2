//! Periodic tick engine.
//!
//! Each registration runs on its own tokio task. Ticks of one registration
//! never overlap: a tick that comes due while the previous one is still
//! running is skipped, not queued. A panicking tick is logged and the
//! registration keeps ticking.

use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error};

/// Work invoked on every tick of a registration.
#[async_trait]
pub trait TickJob: Send + 'static {
    /// Label used in logs.
    fn label(&self) -> String;

    /// Run one tick.
    async fn tick(&mut self);
}

/// Opaque handle of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickHandle(u64);

/// Drives registered jobs at a fixed interval.
#[derive(Default)]
pub struct TickEngine {
    next_id: AtomicU64,
    entries: Mutex<HashMap<TickHandle, JoinHandle<()>>>,
}

impl TickEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ticking `job` every `period`. The first tick fires one period
    /// after registration.
    pub fn register<J: TickJob>(&self, period: Duration, job: J) -> TickHandle {
        let handle = TickHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let label = job.label();

        // Held across the spawn so a job cancelling itself always finds its entry.
        let mut entries = self.lock();
        let task = tokio::spawn(run_job(period, job));
        entries.insert(handle, task);

        debug!(job = %label, ?handle, period_secs = period.as_secs(), "Tick registered");
        handle
    }

    /// Stop future ticks of a registration. A tick already running is
    /// interrupted at its next suspension point; work it spawned keeps
    /// running. Cancelling twice is a no-op.
    pub fn cancel(&self, handle: TickHandle) -> bool {
        match self.lock().remove(&handle) {
            Some(task) => {
                task.abort();
                debug!(?handle, "Tick cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, handle: TickHandle) -> bool {
        self.lock().contains_key(&handle)
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Cancel every registration.
    pub fn shutdown(&self) {
        let tasks: Vec<_> = self.lock().drain().collect();
        for (_, task) in &tasks {
            task.abort();
        }
        debug!(count = tasks.len(), "Tick engine shut down");
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TickHandle, JoinHandle<()>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TickEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_job<J: TickJob>(period: Duration, mut job: J) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        if let Err(panic) = AssertUnwindSafe(job.tick()).catch_unwind().await {
            error!(
                job = %job.label(),
                panic = %panic_message(panic.as_ref()),
                "Tick panicked"
            );
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
