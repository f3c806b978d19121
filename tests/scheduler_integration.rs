//! Integration tests for the scheduler and source lifecycle.
//!
//! A scripted in-process adapter stands in for the network so loop timing,
//! deduplication and cancellation can be observed through the store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use digest_hub::adapter::{AdapterDescriptor, AdapterError, AdapterRegistry, FetchAdapter};
use digest_hub::content::{ContentKind, ContentStore, NewContentItem};
use digest_hub::scheduler::{LoopExit, Scheduler, SchedulerError, SchedulerTiming};
use digest_hub::source::{Cadence, NewSource, SourceKind, SourceRegistry, SourceUpdate};
use digest_hub::{Database, SourceLifecycle};
use tempfile::TempDir;
use tokio::sync::Notify;

const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Shared behaviour of every scripted adapter instance.
#[derive(Default)]
struct Script {
    items_per_fetch: usize,
    fetch_delay: Duration,
    fail: AtomicBool,
    fetches: AtomicUsize,
    fetch_started: Notify,
}

struct ScriptedAdapter {
    source_id: String,
    script: Arc<Script>,
}

#[async_trait]
impl FetchAdapter for ScriptedAdapter {
    fn adapter_id(&self) -> &'static str {
        "scripted"
    }

    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch(&self) -> Result<Vec<NewContentItem>, AdapterError> {
        self.script.fetches.fetch_add(1, Ordering::SeqCst);
        self.script.fetch_started.notify_one();
        if !self.script.fetch_delay.is_zero() {
            tokio::time::sleep(self.script.fetch_delay).await;
        }
        if self.script.fail.load(Ordering::SeqCst) {
            return Err(AdapterError::connectivity(&self.source_id, "scripted outage"));
        }
        Ok((0..self.script.items_per_fetch)
            .map(|n| {
                let mut item = NewContentItem::new(
                    format!("{}:{n}", self.source_id),
                    self.source_id.clone(),
                    ContentKind::Article,
                );
                item.title = format!("Story {n}");
                item.body = format!("Body of story number {n} from {}", self.source_id);
                item.url = Some(format!("https://{}.example.com/{n}", self.source_id));
                item
            })
            .collect())
    }

    async fn test_connection(&self) -> bool {
        true
    }
}

struct Harness {
    scheduler: Scheduler,
    sources: SourceRegistry,
    store: ContentStore,
    db: Database,
    script: Arc<Script>,
    _temp_dir: TempDir,
}

async fn harness(script: Script) -> Harness {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db = Database::new(&temp_dir.path().join("scheduler.db"))
        .await
        .expect("Failed to create database");

    let script = Arc::new(script);
    let constructor_script = Arc::clone(&script);
    let mut adapters = AdapterRegistry::new();
    adapters
        .register(AdapterDescriptor::new(
            "scripted",
            "Scripted",
            move |source_id, _config| {
                Ok(Box::new(ScriptedAdapter {
                    source_id: source_id.to_string(),
                    script: Arc::clone(&constructor_script),
                }))
            },
        ))
        .expect("register scripted adapter");

    let timing = SchedulerTiming {
        check_interval: Duration::from_millis(20),
        cooldown: Duration::from_millis(20),
    };
    Harness {
        scheduler: Scheduler::new(db.clone(), Arc::new(adapters), timing),
        sources: SourceRegistry::new(db.clone()),
        store: ContentStore::new(db.clone()),
        db,
        script,
        _temp_dir: temp_dir,
    }
}

fn scripted_source(id: &str, cadence: Cadence) -> NewSource {
    let mut source = NewSource::new(id, SourceKind::Custom, "scripted");
    source.id = Some(id.to_string());
    source.cadence = cadence;
    source
}

/// Waits until the store holds exactly `expected` items.
async fn wait_for_count(store: &ContentStore, expected: i64) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while tokio::time::Instant::now() < deadline {
        if store.count().await.unwrap_or(-1) == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Polls `check` until it returns true or the wait limit passes.
async fn wait_until(check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_started_source_inserts_items_once() {
    let h = harness(Script {
        items_per_fetch: 3,
        ..Script::default()
    })
    .await;
    h.sources
        .create(scripted_source("feed-1", Cadence::Hourly))
        .await
        .expect("create");

    h.scheduler.start("feed-1").await.expect("start");
    assert!(wait_for_count(&h.store, 3).await);

    // Several check intervals later the hourly source has not been fetched again.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.script.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(h.store.count().await.expect("count"), 3);

    let source = h.sources.get_by_id("feed-1").await.expect("get").unwrap();
    assert!(source.last_retrieved.is_some());

    let summary = h.scheduler.stop_all().await;
    assert_eq!(
        summary.stopped,
        vec![("feed-1".to_string(), LoopExit::Cancelled)]
    );
}

#[tokio::test]
async fn test_five_second_feed_stores_both_items_and_stamps_retrieval() {
    let h = harness(Script {
        items_per_fetch: 2,
        ..Script::default()
    })
    .await;
    h.sources
        .create(scripted_source("feed-1", Cadence::every(5).expect("cadence")))
        .await
        .expect("create");
    let before = chrono::Utc::now();

    h.scheduler.start("feed-1").await.expect("start");
    assert!(wait_for_count(&h.store, 2).await);
    assert_eq!(h.store.get_by_source("feed-1").await.expect("items").len(), 2);

    let source = h.sources.get_by_id("feed-1").await.expect("get").unwrap();
    assert!(source.last_retrieved.is_some_and(|at| at >= before));
    h.scheduler.stop_all().await;
}

#[tokio::test]
async fn test_double_start_keeps_single_loop() {
    let h = harness(Script::default()).await;
    h.sources
        .create(scripted_source("feed-1", Cadence::Manual))
        .await
        .expect("create");

    h.scheduler.start("feed-1").await.expect("first start");
    let err = h.scheduler.start("feed-1").await.unwrap_err();
    assert!(matches!(err, SchedulerError::AlreadyRunning(id) if id == "feed-1"));
    assert_eq!(h.scheduler.running_sources(), vec!["feed-1"]);

    assert!(h.scheduler.stop("feed-1").await);
    assert!(!h.scheduler.is_running("feed-1"));
}

#[tokio::test]
async fn test_concurrent_starts_spawn_one_loop() {
    let h = harness(Script::default()).await;
    h.sources
        .create(scripted_source("feed-1", Cadence::Manual))
        .await
        .expect("create");

    let (a, b) = tokio::join!(h.scheduler.start("feed-1"), h.scheduler.start("feed-1"));
    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
    assert_eq!(h.scheduler.running_sources().len(), 1);
    h.scheduler.stop_all().await;
}

#[tokio::test]
async fn test_purging_running_source_ends_its_loop() {
    let h = harness(Script {
        items_per_fetch: 2,
        ..Script::default()
    })
    .await;
    h.sources
        .create(scripted_source("feed-1", Cadence::Seconds(1)))
        .await
        .expect("create");
    h.scheduler.start("feed-1").await.expect("start");
    assert!(wait_for_count(&h.store, 2).await);

    assert_eq!(h.sources.purge("feed-1").await.expect("purge"), Some(2));
    assert!(wait_until(|| !h.scheduler.is_running("feed-1")).await);

    let fetches = h.script.fetches.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(h.script.fetches.load(Ordering::SeqCst), fetches);
    assert_eq!(h.store.count().await.expect("count"), 0);
}

#[tokio::test]
async fn test_stop_during_fetch_writes_nothing() {
    let h = harness(Script {
        items_per_fetch: 3,
        fetch_delay: Duration::from_secs(30),
        ..Script::default()
    })
    .await;
    h.sources
        .create(scripted_source("slow", Cadence::Hourly))
        .await
        .expect("create");
    h.scheduler.start("slow").await.expect("start");

    tokio::time::timeout(WAIT_LIMIT, h.script.fetch_started.notified())
        .await
        .expect("fetch should start");

    let stopped = tokio::time::timeout(WAIT_LIMIT, h.scheduler.stop("slow"))
        .await
        .expect("stop should not wait for the fetch");
    assert!(stopped);

    assert_eq!(h.store.count().await.expect("count"), 0);
    let source = h.sources.get_by_id("slow").await.expect("get").unwrap();
    assert!(source.last_retrieved.is_none());
}

#[tokio::test]
async fn test_failing_source_retries_after_cooldown() {
    let h = harness(Script {
        items_per_fetch: 1,
        ..Script::default()
    })
    .await;
    h.script.fail.store(true, Ordering::SeqCst);
    h.sources
        .create(scripted_source("flaky", Cadence::Hourly))
        .await
        .expect("create");
    h.scheduler.start("flaky").await.expect("start");

    assert!(wait_until(|| h.script.fetches.load(Ordering::SeqCst) >= 2).await);
    assert!(h.scheduler.is_running("flaky"));
    assert_eq!(h.store.count().await.expect("count"), 0);

    // Recovery: the next attempt after the outage stores the item.
    h.script.fail.store(false, Ordering::SeqCst);
    assert!(wait_for_count(&h.store, 1).await);
    h.scheduler.stop_all().await;
}

#[tokio::test]
async fn test_one_off_fetch_is_idempotent() {
    let h = harness(Script {
        items_per_fetch: 3,
        ..Script::default()
    })
    .await;
    let mut source = scripted_source("feed-1", Cadence::Manual);
    source.enabled = false;
    h.sources.create(source).await.expect("create");

    let first = h.scheduler.one_off_fetch("feed-1").await.expect("first");
    assert_eq!((first.fetched, first.inserted), (3, 3));

    let second = h.scheduler.one_off_fetch("feed-1").await.expect("second");
    assert_eq!((second.fetched, second.inserted, second.skipped()), (3, 0, 3));
    assert_eq!(h.store.count().await.expect("count"), 3);

    let stored = h.sources.get_by_id("feed-1").await.expect("get").unwrap();
    assert!(
        stored
            .last_retrieved
            .is_some_and(|at| at >= first.retrieved_at)
    );
    assert!(!h.scheduler.is_running("feed-1"));
}

#[tokio::test]
async fn test_one_off_fetch_unknown_source() {
    let h = harness(Script::default()).await;
    assert!(matches!(
        h.scheduler.one_off_fetch("nope").await,
        Err(SchedulerError::NotFound(id)) if id == "nope"
    ));
}

#[tokio::test]
async fn test_lifecycle_update_restarts_running_loop() {
    let h = harness(Script {
        items_per_fetch: 1,
        ..Script::default()
    })
    .await;
    let lifecycle = SourceLifecycle::new(h.sources.clone(), h.scheduler.clone());

    lifecycle
        .add_source(scripted_source("feed-1", Cadence::Hourly))
        .await
        .expect("add");
    assert!(h.scheduler.is_running("feed-1"));
    assert!(wait_for_count(&h.store, 1).await);

    let updated = lifecycle
        .update_source(
            "feed-1",
            SourceUpdate {
                name: Some("Renamed".to_string()),
                ..SourceUpdate::default()
            },
        )
        .await
        .expect("update");
    assert_eq!(updated.name, "Renamed");
    assert!(h.scheduler.is_running("feed-1"));

    assert_eq!(
        lifecycle.purge_source("feed-1").await.expect("purge"),
        Some(1)
    );
    assert!(!h.scheduler.is_running("feed-1"));
    assert_eq!(h.store.count().await.expect("count"), 0);
    h.db.close().await;
}
