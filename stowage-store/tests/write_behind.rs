use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use smol_str::SmolStr;
use stowage_core::{EntryKey, Offload, StoreEntry};
use stowage_store::testing::{MemoryStore, TokioOffload};
use stowage_store::{AsyncStoreConfig, Store, StoreError, WriteBehindStore};
use tokio::task::JoinHandle;

/// Offload whose tasks can be aborted from the test.
#[derive(Clone, Default)]
struct AbortableOffload {
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl AbortableOffload {
    fn abort_all(&self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}

impl Offload for AbortableOffload {
    fn spawn<F>(&self, _kind: impl Into<SmolStr>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.lock().unwrap().push(tokio::spawn(future));
    }
}

fn config() -> AsyncStoreConfig {
    AsyncStoreConfig::enabled()
        .flush_interval(Duration::from_millis(100))
        .shutdown_timeout(Duration::from_secs(5))
}

fn capacity(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

#[tokio::test]
async fn test_coalesces_writes_to_same_key() {
    let inner = MemoryStore::new("jdbc");
    let store = WriteBehindStore::new(inner.clone(), TokioOffload::default(), config());
    store.start().await.unwrap();

    store.store(StoreEntry::new("k", "v1")).await.unwrap();
    store.store(StoreEntry::new("k", "v2")).await.unwrap();
    store.stop().await.unwrap();

    assert_eq!(&inner.get("k").unwrap().value()[..], b"v2");
    assert_eq!(inner.counters().stores.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_clear_supersedes_earlier_writes() {
    let inner = MemoryStore::new("jdbc");
    inner.seed(StoreEntry::new("old", "v"));
    let store = WriteBehindStore::new(inner.clone(), TokioOffload::default(), config());
    store.start().await.unwrap();

    store.store(StoreEntry::new("a", "1")).await.unwrap();
    store.remove(&EntryKey::new("old")).await.unwrap();
    store.clear().await.unwrap();
    store.store(StoreEntry::new("c", "3")).await.unwrap();
    store.stop().await.unwrap();

    assert_eq!(inner.len(), 1);
    assert!(inner.get("c").is_some());
    let counters = inner.counters();
    assert_eq!(counters.clears.load(Ordering::SeqCst), 1);
    assert_eq!(counters.removes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_loads_do_not_see_queued_writes() {
    let inner = MemoryStore::new("jdbc");
    let store = WriteBehindStore::new(inner.clone(), TokioOffload::default(), config());

    store.store(StoreEntry::new("k", "v")).await.unwrap();

    assert_eq!(store.pending(), 1);
    assert!(store.load(&EntryKey::new("k")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_stop_drains_queue_and_stops_inner() {
    let inner = MemoryStore::new("jdbc");
    let store = WriteBehindStore::new(
        inner.clone(),
        TokioOffload::default(),
        config().flush_interval(Duration::from_millis(5)),
    );
    store.start().await.unwrap();

    for i in 0..10 {
        store
            .store(StoreEntry::new(format!("k{i}"), "v"))
            .await
            .unwrap();
    }
    store.stop().await.unwrap();

    assert_eq!(inner.len(), 10);
    assert_eq!(inner.counters().stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_writes_after_stop_fail() {
    let store = WriteBehindStore::new(
        MemoryStore::new("jdbc"),
        TokioOffload::default(),
        config(),
    );
    store.start().await.unwrap();
    store.stop().await.unwrap();

    let err = store.store(StoreEntry::new("k", "v")).await.unwrap_err();
    assert!(matches!(err, StoreError::Stopped { .. }));
    let err = store.clear().await.unwrap_err();
    assert!(matches!(err, StoreError::Stopped { .. }));
}

#[tokio::test]
async fn test_full_queue_times_out() {
    // Never started, so nothing drains the queue.
    let store = WriteBehindStore::new(
        MemoryStore::new("jdbc"),
        TokioOffload::default(),
        config()
            .queue_capacity(capacity(1))
            .offer_timeout(Duration::from_millis(20)),
    );

    store.store(StoreEntry::new("a", "1")).await.unwrap();
    let err = store.store(StoreEntry::new("b", "2")).await.unwrap_err();

    match err {
        StoreError::QueueFull { capacity, .. } => assert_eq!(capacity, 1),
        other => panic!("expected QueueFull, got {other:?}"),
    }
}

#[tokio::test]
async fn test_full_queue_blocks_until_drained() {
    let inner = MemoryStore::new("jdbc");
    let store = WriteBehindStore::new(
        inner.clone(),
        TokioOffload::default(),
        config()
            .queue_capacity(capacity(1))
            .flush_interval(Duration::ZERO),
    );
    store.start().await.unwrap();

    for i in 0..5 {
        store
            .store(StoreEntry::new(format!("k{i}"), "v"))
            .await
            .unwrap();
    }
    store.stop().await.unwrap();

    assert_eq!(inner.len(), 5);
}

#[tokio::test]
async fn test_failed_writes_are_retried() {
    let inner = MemoryStore::new("jdbc");
    inner.fail_writes(2);
    let store = WriteBehindStore::new(
        inner.clone(),
        TokioOffload::default(),
        config().max_retries(3),
    );
    store.start().await.unwrap();

    store.store(StoreEntry::new("k", "v")).await.unwrap();
    store.stop().await.unwrap();

    assert!(inner.get("k").is_some());
    assert_eq!(inner.counters().stores.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_write_dropped_after_retries() {
    let inner = MemoryStore::new("jdbc");
    inner.fail_writes(100);
    let store = WriteBehindStore::new(
        inner.clone(),
        TokioOffload::default(),
        config().max_retries(1),
    );
    store.start().await.unwrap();

    store.store(StoreEntry::new("k", "v")).await.unwrap();
    store.stop().await.unwrap();

    assert!(inner.is_empty());
    assert_eq!(inner.counters().stores.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_shutdown_timeout_discards_unflushed() {
    let inner = MemoryStore::new("jdbc");
    inner.write_delay(Duration::from_millis(200));
    let store = WriteBehindStore::new(
        inner.clone(),
        TokioOffload::default(),
        config()
            .flush_interval(Duration::ZERO)
            .shutdown_timeout(Duration::from_millis(30)),
    );
    store.start().await.unwrap();

    for i in 0..5 {
        store
            .store(StoreEntry::new(format!("k{i}"), "v"))
            .await
            .unwrap();
    }
    let started = Instant::now();
    store.stop().await.unwrap();

    assert!(started.elapsed() < Duration::from_millis(200));
    assert!(inner.len() < 5);
    assert_eq!(inner.len() + store.unflushed(), 5);
    assert_eq!(inner.counters().stops.load(Ordering::SeqCst), 1);

    // The worker is gone: nothing lands after stop returned.
    let stopped_with = inner.len();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(inner.len(), stopped_with);
}

#[tokio::test]
async fn test_stop_reports_worker_cancelled_from_outside() {
    let inner = MemoryStore::new("jdbc");
    let offload = AbortableOffload::default();
    let store = WriteBehindStore::new(inner.clone(), offload.clone(), config());
    store.start().await.unwrap();

    store.store(StoreEntry::new("k", "v")).await.unwrap();
    assert_eq!(store.unflushed(), 1);
    offload.abort_all();

    let started = Instant::now();
    store.stop().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(inner.is_empty());
    assert_eq!(store.unflushed(), 1);
    assert_eq!(inner.counters().stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_drained_stop_leaves_nothing_unflushed() {
    let inner = MemoryStore::new("jdbc");
    let store = WriteBehindStore::new(inner.clone(), TokioOffload::default(), config());
    store.start().await.unwrap();

    store.store(StoreEntry::new("a", "1")).await.unwrap();
    store.store(StoreEntry::new("a", "2")).await.unwrap();
    store.remove(&EntryKey::new("b")).await.unwrap();
    store.stop().await.unwrap();

    assert_eq!(store.unflushed(), 0);
    assert_eq!(inner.len(), 1);
}

#[tokio::test]
async fn test_single_worker_per_store() {
    let offload = TokioOffload::default();
    let store = WriteBehindStore::new(MemoryStore::new("jdbc"), offload.clone(), config());

    store.start().await.unwrap();
    store.start().await.unwrap();
    store.stop().await.unwrap();

    assert_eq!(offload.spawned(), 1);
}

#[tokio::test]
async fn test_identity_forwarded() {
    let store = WriteBehindStore::new(
        MemoryStore::new("jdbc"),
        TokioOffload::default(),
        config(),
    );

    assert_eq!(store.label().as_str(), "write-behind.jdbc");
    assert_eq!(store.store_type(), std::any::type_name::<MemoryStore>());
}
