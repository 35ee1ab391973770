use std::sync::Arc;

use stowage_core::{EntryKey, StoreEntry};
use stowage_store::testing::MemoryStore;
use stowage_store::{ReadOnlyStore, Store};

#[tokio::test]
async fn test_writes_never_reach_wrapped_store() {
    let inner = MemoryStore::new("file");
    inner.seed(StoreEntry::new("existing", "v0"));
    let store = ReadOnlyStore::new(inner.clone());

    store.store(StoreEntry::new("new", "v1")).await.unwrap();
    store.store(StoreEntry::new("existing", "v2")).await.unwrap();
    let removed = store.remove(&EntryKey::new("existing")).await.unwrap();
    store.clear().await.unwrap();

    assert!(!removed);
    assert_eq!(inner.len(), 1);
    assert_eq!(&inner.get("existing").unwrap().value()[..], b"v0");
    assert!(inner.get("new").is_none());
    assert_eq!(inner.counters().stores.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_loads_pass_through() {
    let inner = MemoryStore::new("file");
    inner.seed(StoreEntry::new("k", "v"));
    let store = ReadOnlyStore::new(inner);

    let loaded = store.load(&EntryKey::new("k")).await.unwrap();
    assert_eq!(&loaded.unwrap().value()[..], b"v");
    assert!(store.load(&EntryKey::new("missing")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_bulk_load_passes_through() {
    let inner = MemoryStore::new("file");
    inner.seed(StoreEntry::new("a", "1"));
    inner.seed(StoreEntry::new("b", "2"));
    let store = ReadOnlyStore::new(inner.clone());

    assert!(store.supports_bulk_load());
    let mut cursor = store.bulk_load().await.unwrap();
    let mut keys = Vec::new();
    while let Some(entry) = cursor.next_entry().await.unwrap() {
        keys.push(entry.key().to_string());
    }
    cursor.close().await.unwrap();

    assert_eq!(keys, vec!["a", "b"]);
    let counters = inner.counters();
    assert_eq!(counters.cursors_closed.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_identity_forwarded_through_trait_object() {
    let store: Arc<dyn Store> = Arc::new(ReadOnlyStore::new(MemoryStore::new("file")));

    assert_eq!(store.label().as_str(), "read-only.file");
    assert_eq!(store.store_type(), std::any::type_name::<MemoryStore>());
}
