//! Verifies that write-behind and purge metrics are recorded with the store
//! label.

#![cfg(feature = "metrics")]

use std::time::Duration;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use metrics_util::{CompositeKey, MetricKind};
use stowage_core::StoreEntry;
use stowage_store::testing::{MemoryStore, TokioOffload};
use stowage_store::{AsyncStoreConfig, ChainBuilder, Store, StoreConfig, StoreRegistry, WriteBehindStore};

type SnapshotEntry = (
    CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
);

fn find_counter(entries: &[SnapshotEntry], name: &str, store: &str) -> Option<u64> {
    for (key, _, _, value) in entries {
        if key.kind() == MetricKind::Counter && key.key().name() == name {
            for label in key.key().labels() {
                if label.key() == "store"
                    && label.value() == store
                    && let DebugValue::Counter(v) = *value
                {
                    return Some(v);
                }
            }
        }
    }
    None
}

fn histogram_count(entries: &[SnapshotEntry], name: &str, store: &str) -> usize {
    for (key, _, _, value) in entries {
        if key.kind() == MetricKind::Histogram && key.key().name() == name {
            for label in key.key().labels() {
                if label.key() == "store"
                    && label.value() == store
                    && let DebugValue::Histogram(v) = value
                {
                    return v.len();
                }
            }
        }
    }
    0
}

#[test]
fn test_write_behind_metrics() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        // Single-threaded runtime so the worker records on this thread too.
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let inner = MemoryStore::new("jdbc");
            let store = WriteBehindStore::new(
                inner,
                TokioOffload::default(),
                AsyncStoreConfig::enabled().flush_interval(Duration::from_millis(50)),
            );
            store.start().await.unwrap();
            store.store(StoreEntry::new("k", "v1")).await.unwrap();
            store.store(StoreEntry::new("k", "v2")).await.unwrap();
            store.store(StoreEntry::new("other", "v")).await.unwrap();
            store.stop().await.unwrap();
        })
    });

    let entries = snapshotter.snapshot().into_vec();

    assert_eq!(
        find_counter(&entries, "stowage_write_behind_enqueued_total", "jdbc"),
        Some(3)
    );
    assert_eq!(
        find_counter(&entries, "stowage_write_behind_applied_total", "jdbc"),
        Some(2)
    );
    assert_eq!(
        find_counter(&entries, "stowage_write_behind_coalesced_total", "jdbc"),
        Some(1)
    );
}

#[test]
fn test_purge_metrics() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let ok = MemoryStore::new("ok");
            let failing = MemoryStore::new("failing");
            failing.fail_purge(true);
            let registry = [ok, failing]
                .into_iter()
                .fold(StoreRegistry::new(), |registry, store| {
                    let name = store.label().as_str().to_owned();
                    registry.register(name, move |_config: &StoreConfig| {
                        Ok(std::sync::Arc::new(store.clone()) as std::sync::Arc<dyn Store>)
                    })
                });
            let chain = ChainBuilder::new(registry, TokioOffload::default())
                .store(StoreConfig::new("ok"))
                .store(StoreConfig::new("failing"))
                .build()
                .unwrap();
            chain.purge_members().await;
        })
    });

    let entries = snapshotter.snapshot().into_vec();

    assert_eq!(
        histogram_count(&entries, "stowage_store_purge_duration_seconds", "ok"),
        1
    );
    assert_eq!(
        find_counter(&entries, "stowage_store_purge_errors_total", "failing"),
        Some(1)
    );
    assert_eq!(find_counter(&entries, "stowage_store_purge_errors_total", "ok"), None);
}
