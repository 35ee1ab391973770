use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use stowage::offload::{OffloadConfig, OffloadManager, TimeoutPolicy};
use stowage::{CacheHandle, LoaderManager, LoadersConfig};
use stowage_core::Offload;
use stowage_store::testing::{MemoryStore, RecordingCache};
use stowage_store::{AsyncStoreConfig, Store, StoreConfig, StoreRegistry};

#[tokio::test]
async fn test_spawn_and_wait_all() {
    let offload = OffloadManager::default();
    let done = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let done = done.clone();
        offload.spawn("purge", async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            done.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(offload.active_tasks_of_kind("purge"), 3);

    assert!(offload.wait_all_timeout(Duration::from_secs(1)).await);
    assert_eq!(done.load(Ordering::SeqCst), 3);
    assert_eq!(offload.active_task_count(), 0);
}

#[tokio::test]
async fn test_keys_are_unique() {
    let offload = OffloadManager::default();

    let first = offload.spawn("coordinator", async {});
    let second = offload.spawn("coordinator", async {});

    assert_eq!(first.kind, "coordinator");
    assert_ne!(first, second);
    offload.wait_all().await;
}

#[tokio::test]
async fn test_cancel_policy_stops_long_task() {
    let offload = OffloadManager::new(OffloadConfig::cancel_after(Duration::from_millis(20)));
    let finished = Arc::new(AtomicUsize::new(0));
    let flag = finished.clone();

    offload.spawn("write-behind", async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        flag.fetch_add(1, Ordering::SeqCst);
    });

    assert!(offload.wait_all_timeout(Duration::from_secs(1)).await);
    assert_eq!(finished.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_warn_policy_lets_task_finish() {
    let offload = OffloadManager::new(OffloadConfig::warn_after(Duration::from_millis(1)));
    let finished = Arc::new(AtomicUsize::new(0));
    let flag = finished.clone();

    offload.spawn("purge", async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        flag.fetch_add(1, Ordering::SeqCst);
    });

    assert!(offload.wait_all_timeout(Duration::from_secs(1)).await);
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[test]
fn test_policy_limit() {
    assert_eq!(TimeoutPolicy::None.limit(), None);
    assert_eq!(
        TimeoutPolicy::Warn(Duration::from_secs(1)).limit(),
        Some(Duration::from_secs(1))
    );
    assert_eq!(OffloadConfig::default().timeout_policy, TimeoutPolicy::None);
}

#[tokio::test]
async fn test_cancel_by_key() {
    let offload = OffloadManager::default();

    let key = offload.spawn("purge", async {
        tokio::time::sleep(Duration::from_secs(10)).await;
    });
    assert!(offload.is_in_flight(&key));

    assert!(offload.cancel(&key));
    assert!(!offload.cancel(&key));
    assert!(offload.wait_all_timeout(Duration::from_secs(1)).await);
    assert!(!offload.is_in_flight(&key));
}

#[tokio::test]
async fn test_shutdown_aborts_stragglers() {
    let offload = OffloadManager::default();
    offload.spawn("purge", async {});
    offload.spawn("coordinator", async {
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let aborted = offload.shutdown(Duration::from_millis(50)).await;

    assert_eq!(aborted, 1);
    assert_eq!(offload.active_task_count(), 0);
}

#[tokio::test]
async fn test_usable_through_offload_trait() {
    fn run(offload: &impl Offload, counter: Arc<AtomicUsize>) {
        offload.spawn("write-behind", async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }

    let offload = OffloadManager::default();
    let counter = Arc::new(AtomicUsize::new(0));
    run(&offload, counter.clone());

    assert!(offload.wait_all_timeout(Duration::from_secs(1)).await);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_loader_manager_tracks_write_behind_worker() {
    let store = MemoryStore::new("jdbc");
    let backend = store.clone();
    let registry = StoreRegistry::new().register("jdbc", move |_config: &StoreConfig| {
        Ok(Arc::new(backend.clone()) as Arc<dyn Store>)
    });
    let manager = LoaderManager::builder(Arc::new(RecordingCache::new()) as Arc<dyn CacheHandle>)
        .config(
            LoadersConfig::builder()
                .store(StoreConfig::new("jdbc").async_store(AsyncStoreConfig::enabled()))
                .build(),
        )
        .registry(registry)
        .offload_config(OffloadConfig::warn_after(Duration::from_secs(60)))
        .build();

    manager.start().await.unwrap();
    assert_eq!(manager.offload().active_tasks_of_kind("write-behind"), 1);

    manager.stop().await.unwrap();
    assert!(manager.offload().wait_all_timeout(Duration::from_secs(1)).await);
}
