//! Job registry and scheduler core.
//!
//! The registry maps each watch key to its tick registration. The lock
//! around the map is held only while the map and the registration change,
//! never across provider or delivery calls.

use crate::dispatcher::Dispatcher;
use crate::job::WatchJob;
use crate::ticker::{TickEngine, TickHandle};
use pipewatch_config::SchedulerSettings;
use pipewatch_core::{StatusProvider, Watch, WatchKey};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::info;

/// Tick cadence and expiry threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Delay between two ticks of a watch.
    pub interval: Duration,
    /// A single-pipeline watch expires on the first tick whose count
    /// exceeds this value.
    pub expiry_ticks: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&SchedulerSettings::default())
    }
}

impl From<&SchedulerSettings> for SchedulerConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            interval: Duration::from_secs(settings.interval_secs),
            expiry_ticks: settings.expiry_ticks,
        }
    }
}

/// A live registration. The generation tells apart successive watches
/// added under the same key.
#[derive(Debug, Clone, Copy)]
struct Entry {
    handle: TickHandle,
    generation: u64,
}

/// Owns every live watch.
pub struct Scheduler {
    engine: TickEngine,
    jobs: Mutex<HashMap<WatchKey, Entry>>,
    next_generation: AtomicU64,
    provider: Arc<dyn StatusProvider>,
    dispatcher: Arc<Dispatcher>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        provider: Arc<dyn StatusProvider>,
        dispatcher: Arc<Dispatcher>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine: TickEngine::new(),
            jobs: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            provider,
            dispatcher,
            config,
        })
    }

    /// Start ticking a watch, replacing any watch registered under the same key.
    pub fn add(self: &Arc<Self>, watch: Watch) {
        let key = watch.key.clone();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let job = WatchJob::new(watch, Arc::clone(self), generation);

        let mut jobs = self.lock();
        if let Some(previous) = jobs.remove(&key) {
            self.engine.cancel(previous.handle);
            info!(key = %key, "Replacing existing watch");
        }
        let handle = self.engine.register(self.config.interval, job);
        jobs.insert(key.clone(), Entry { handle, generation });

        info!(key = %key, "Watch added");
    }

    /// Stop a watch. Returns false when no watch was registered under `key`.
    pub fn remove(&self, key: &WatchKey) -> bool {
        let mut jobs = self.lock();
        match jobs.remove(key) {
            Some(entry) => {
                self.engine.cancel(entry.handle);
                info!(key = %key, "Watch removed");
                true
            }
            None => false,
        }
    }

    /// Remove a watch on behalf of the job itself. A job that has since been
    /// replaced under the same key leaves the newer watch alone.
    pub(crate) fn retire(&self, key: &WatchKey, generation: u64) -> bool {
        let mut jobs = self.lock();
        match jobs.get(key) {
            Some(entry) if entry.generation == generation => {
                self.engine.cancel(entry.handle);
                jobs.remove(key);
                info!(key = %key, "Watch removed");
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, key: &WatchKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Keys of all live watches, sorted.
    pub fn keys(&self) -> Vec<WatchKey> {
        let mut keys: Vec<_> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of live tick registrations.
    pub fn active_ticks(&self) -> usize {
        self.engine.active_count()
    }

    pub fn provider(&self) -> &Arc<dyn StatusProvider> {
        &self.provider
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Stop every watch.
    pub fn shutdown(&self) {
        let mut jobs = self.lock();
        let count = jobs.len();
        jobs.clear();
        self.engine.shutdown();
        info!(count, "Scheduler shut down");
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<WatchKey, Entry>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
