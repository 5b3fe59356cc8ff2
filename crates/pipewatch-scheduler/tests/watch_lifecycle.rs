//! End-to-end watch lifecycles driven by the tick engine on paused time.

use async_trait::async_trait;
use pipewatch_core::pipeline::{Pipeline, PipelineSummary};
use pipewatch_core::{
    Error, MessageFormat, NotificationSink, PipelineQuery, Result, StatusProvider, Watch, WatchKey,
};
use pipewatch_scheduler::{Dispatcher, Scheduler, SchedulerConfig, Tracker};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const RECIPIENT: i64 = 42;
const PROJECT: &str = "group/app";

#[derive(Debug, Clone, Copy)]
enum Step {
    Status(&'static str),
    Fail,
    Panic,
    /// The call never returns.
    Hang,
}

#[derive(Default)]
struct FakeProvider {
    steps: Mutex<HashMap<u64, VecDeque<Step>>>,
    listings: Mutex<VecDeque<Vec<u64>>>,
    fetched: Mutex<Vec<u64>>,
    queries: Mutex<Vec<PipelineQuery>>,
}

impl FakeProvider {
    fn script(&self, pipeline_id: u64, steps: &[Step]) {
        self.steps
            .lock()
            .unwrap()
            .entry(pipeline_id)
            .or_default()
            .extend(steps.iter().copied());
    }

    fn list_next(&self, ids: &[u64]) {
        self.listings.lock().unwrap().push_back(ids.to_vec());
    }

    fn fetched(&self) -> Vec<u64> {
        self.fetched.lock().unwrap().clone()
    }

    fn queries(&self) -> Vec<PipelineQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn get_pipeline(&self, _project: &str, pipeline_id: u64) -> Result<Pipeline> {
        self.fetched.lock().unwrap().push(pipeline_id);
        let step = self
            .steps
            .lock()
            .unwrap()
            .get_mut(&pipeline_id)
            .and_then(|steps| steps.pop_front());

        match step {
            Some(Step::Status(status)) => Ok(pipeline(pipeline_id, status)),
            Some(Step::Fail) => Err(Error::Provider("connection reset".to_string())),
            Some(Step::Panic) => panic!("provider blew up on pipeline {}", pipeline_id),
            Some(Step::Hang) => std::future::pending().await,
            None => Err(Error::NotFound(format!("pipeline {}", pipeline_id))),
        }
    }

    async fn list_pipelines(
        &self,
        _project: &str,
        query: &PipelineQuery,
    ) -> Result<Vec<PipelineSummary>> {
        self.queries.lock().unwrap().push(query.clone());
        let ids = self.listings.lock().unwrap().pop_front().unwrap_or_default();
        Ok(ids
            .into_iter()
            .map(|id| PipelineSummary {
                id,
                status: "running".to_string(),
                ref_name: "main".to_string(),
                web_url: String::new(),
                updated_at: None,
            })
            .collect())
    }
}

#[derive(Default)]
struct RecordingSink {
    delivered: Mutex<Vec<(i64, String, MessageFormat)>>,
}

impl RecordingSink {
    fn messages(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text, _)| text.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, recipient: i64, text: &str, format: MessageFormat) -> Result<()> {
        self.delivered
            .lock()
            .unwrap()
            .push((recipient, text.to_string(), format));
        Ok(())
    }
}

fn pipeline(id: u64, status: &str) -> Pipeline {
    Pipeline {
        id,
        status: status.to_string(),
        web_url: format!("https://git.example.com/{}/-/pipelines/{}", PROJECT, id),
        ref_name: "main".to_string(),
        started_at: None,
        finished_at: None,
        duration: None,
        updated_at: None,
    }
}

struct Harness {
    provider: Arc<FakeProvider>,
    sink: Arc<RecordingSink>,
    scheduler: Arc<Scheduler>,
}

impl Harness {
    fn new() -> Self {
        let provider = Arc::new(FakeProvider::default());
        let sink = Arc::new(RecordingSink::default());
        let scheduler = Scheduler::new(
            provider.clone(),
            Arc::new(Dispatcher::new(sink.clone())),
            SchedulerConfig::default(),
        );
        Self {
            provider,
            sink,
            scheduler,
        }
    }
}

/// Move paused time from `from_secs` to `to_secs`.
async fn advance(from_secs: u64, to_secs: u64) {
    tokio::time::sleep(Duration::from_secs(to_secs - from_secs)).await;
    tokio::task::yield_now().await;
}

#[tokio::test(start_paused = true)]
async fn test_single_pipeline_notifies_once_on_change() {
    let h = Harness::new();
    h.provider.script(
        12345,
        &[Step::Status("running"), Step::Status("success")],
    );
    let watch = Watch::single_pipeline(RECIPIENT, PROJECT, 12345, "running");
    h.scheduler.add(watch.clone());

    advance(0, 11).await;
    assert_eq!(h.provider.fetched(), vec![12345]);
    assert!(h.sink.messages().is_empty());
    assert!(h.scheduler.contains(&watch.key));

    advance(11, 21).await;
    let messages = h.sink.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("**pipeline status changed**\n"));
    assert!(messages[0].contains("✅"));
    assert!(!h.scheduler.contains(&watch.key));
    assert_eq!(h.scheduler.active_ticks(), 0);

    advance(21, 31).await;
    assert_eq!(h.provider.fetched().len(), 2);
    assert_eq!(h.sink.messages().len(), 1);

    // Late removal of an already removed watch.
    assert!(!h.scheduler.remove(&watch.key));
}

#[tokio::test(start_paused = true)]
async fn test_expiry_skips_provider_and_removes_watch() {
    let h = Harness::new();
    h.provider.script(12345, &[Step::Status("success")]);
    let mut watch = Watch::single_pipeline(RECIPIENT, PROJECT, 12345, "running");
    watch.tick_count = 360;
    h.scheduler.add(watch.clone());

    advance(0, 11).await;
    assert_eq!(
        h.sink.messages(),
        vec!["**pipeline 12345 monitored too long**\ntask deleted, you can retry it".to_string()]
    );
    assert!(h.provider.fetched().is_empty());
    assert!(!h.scheduler.contains(&watch.key));

    advance(11, 41).await;
    assert_eq!(h.sink.messages().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_watch_expires_on_tick_361() {
    let h = Harness::new();
    h.provider.script(12345, &[Step::Status("running"); 360]);
    let watch = Watch::single_pipeline(RECIPIENT, PROJECT, 12345, "running");
    h.scheduler.add(watch.clone());

    advance(0, 3601).await;
    assert_eq!(h.provider.fetched().len(), 360);
    assert!(h.sink.messages().is_empty());
    assert!(h.scheduler.contains(&watch.key));

    advance(3601, 3611).await;
    assert_eq!(h.provider.fetched().len(), 360);
    assert_eq!(h.sink.messages().len(), 1);
    assert!(h.sink.messages()[0].contains("monitored too long"));
    assert!(!h.scheduler.contains(&watch.key));
}

#[tokio::test(start_paused = true)]
async fn test_provider_error_keeps_state() {
    let h = Harness::new();
    h.provider.script(
        12345,
        &[Step::Fail, Step::Status("running"), Step::Status("failed")],
    );
    let watch = Watch::single_pipeline(RECIPIENT, PROJECT, 12345, "running");
    h.scheduler.add(watch.clone());

    advance(0, 21).await;
    assert_eq!(h.provider.fetched().len(), 2);
    assert!(h.sink.messages().is_empty());
    assert!(h.scheduler.contains(&watch.key));

    advance(21, 31).await;
    assert_eq!(h.sink.messages().len(), 1);
    assert!(!h.scheduler.contains(&watch.key));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_initial_status_counts_as_change() {
    let h = Harness::new();
    h.provider.script(7, &[Step::Status("pending"), Step::Status("running")]);
    let watch = Watch::single_pipeline(RECIPIENT, PROJECT, 7, "");
    h.scheduler.add(watch.clone());

    advance(0, 11).await;
    let messages = h.sink.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("**pipeline status changed**\n"));
    assert!(!h.scheduler.contains(&watch.key));

    advance(11, 21).await;
    assert_eq!(h.provider.fetched(), vec![7]);
}

#[tokio::test(start_paused = true)]
async fn test_hung_check_does_not_block_expiry() {
    let h = Harness::new();
    h.provider.script(12345, &[Step::Hang]);
    let mut watch = Watch::single_pipeline(RECIPIENT, PROJECT, 12345, "running");
    watch.tick_count = 359;
    h.scheduler.add(watch.clone());

    advance(0, 3600).await;
    assert_eq!(
        h.sink.messages(),
        vec!["**pipeline 12345 monitored too long**\ntask deleted, you can retry it".to_string()]
    );
    assert_eq!(h.provider.fetched(), vec![12345]);
    assert!(!h.scheduler.contains(&watch.key));
}

#[tokio::test(start_paused = true)]
async fn test_hung_watch_does_not_delay_others() {
    let h = Harness::new();
    h.provider.script(1, &[Step::Hang]);
    h.provider.script(2, &[Step::Status("running"), Step::Status("success")]);
    let mut hung = Watch::single_pipeline(RECIPIENT, PROJECT, 1, "running");
    hung.tick_count = 357;
    let healthy = Watch::single_pipeline(RECIPIENT, PROJECT, 2, "running");
    h.scheduler.add(hung.clone());
    h.scheduler.add(healthy.clone());

    advance(0, 21).await;
    let messages = h.sink.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("pipelines/2"));
    assert!(!h.scheduler.contains(&healthy.key));
    assert!(h.scheduler.contains(&hung.key));

    // Ticks 359 and 360 find the first check still running and start none.
    advance(21, 41).await;
    let messages = h.sink.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[1].contains("pipeline 1 monitored too long"));
    assert!(h.scheduler.is_empty());
    assert_eq!(h.provider.fetched().iter().filter(|id| **id == 1).count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_check_is_contained() {
    let h = Harness::new();
    h.provider.script(1, &[Step::Panic, Step::Status("success")]);
    h.provider.script(2, &[Step::Status("running"), Step::Status("failed")]);
    let first = Watch::single_pipeline(RECIPIENT, PROJECT, 1, "running");
    let second = Watch::single_pipeline(RECIPIENT, PROJECT, 2, "running");
    h.scheduler.add(first.clone());
    h.scheduler.add(second.clone());

    advance(0, 11).await;
    assert!(h.scheduler.contains(&first.key));
    assert!(h.scheduler.contains(&second.key));
    assert!(h.sink.messages().is_empty());

    advance(11, 21).await;
    assert_eq!(h.sink.messages().len(), 2);
    assert!(h.scheduler.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_readding_a_key_restarts_the_watch() {
    let h = Harness::new();
    h.provider.script(12345, &[Step::Status("running"); 3]);
    let watch = Watch::single_pipeline(RECIPIENT, PROJECT, 12345, "running");

    h.scheduler.add(watch.clone());
    advance(0, 5).await;
    h.scheduler.add(watch.clone());

    // Only the second registration ticks, first at 15s.
    advance(5, 11).await;
    assert!(h.provider.fetched().is_empty());

    advance(11, 16).await;
    assert_eq!(h.provider.fetched().len(), 1);
    assert_eq!(h.scheduler.active_ticks(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_project_watch_checkpoint_advances() {
    let h = Harness::new();
    let tracker = Tracker::with_scheduler(h.scheduler.clone());
    h.provider.list_next(&[]);
    h.provider.list_next(&[10, 11]);
    h.provider.script(10, &[Step::Status("success")]);
    h.provider.script(11, &[Step::Status("failed")]);

    let seeded = tracker.seed_projects(
        &[PROJECT.to_string()],
        Some(RECIPIENT),
        Some("alice".to_string()),
    );
    assert_eq!(seeded, 1);

    advance(0, 31).await;

    let queries = h.provider.queries();
    assert_eq!(queries.len(), 3);
    // The first window only looks forward from now.
    assert_eq!(queries[0].updated_after, queries[0].updated_before);
    for pair in queries.windows(2) {
        assert_eq!(pair[1].updated_after, pair[0].updated_before);
    }
    for query in &queries {
        assert!(query.updated_after <= query.updated_before);
        assert_eq!(query.username.as_deref(), Some("alice"));
    }

    let messages = h.sink.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.starts_with("**Pipeline updated**\n")));
    assert!(h.scheduler.contains(&WatchKey::for_project(RECIPIENT, PROJECT)));
}

#[tokio::test(start_paused = true)]
async fn test_project_watch_fetch_failure_drops_rest_of_tick() {
    let h = Harness::new();
    h.provider.list_next(&[1, 2, 3]);
    h.provider.script(1, &[Step::Status("success")]);
    h.provider.script(2, &[Step::Fail]);
    h.provider.script(3, &[Step::Status("success")]);
    h.scheduler.add(Watch::project_wide(RECIPIENT, PROJECT, None));

    advance(0, 11).await;
    assert_eq!(h.provider.fetched(), vec![1, 2]);
    assert_eq!(h.sink.messages().len(), 1);

    // Still armed after a failed tick.
    advance(11, 21).await;
    assert_eq!(h.provider.queries().len(), 2);
    assert_eq!(h.scheduler.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_delivery_failure_does_not_affect_watch_state() {
    struct RejectingSink;

    #[async_trait]
    impl NotificationSink for RejectingSink {
        async fn deliver(&self, _: i64, _: &str, _: MessageFormat) -> Result<()> {
            Err(Error::Delivery("chat not found".to_string()))
        }
    }

    let provider = Arc::new(FakeProvider::default());
    provider.script(12345, &[Step::Status("success")]);
    let scheduler = Scheduler::new(
        provider.clone(),
        Arc::new(Dispatcher::new(Arc::new(RejectingSink))),
        SchedulerConfig::default(),
    );
    scheduler.add(Watch::single_pipeline(RECIPIENT, PROJECT, 12345, "running"));

    advance(0, 11).await;
    assert!(scheduler.is_empty());
}
