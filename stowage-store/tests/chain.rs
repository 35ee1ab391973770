use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use stowage_core::{BoxError, CoordinatorEvent, EntryKey, StoreEntry};
use stowage_store::testing::{MemoryStore, RecordingCache, TokioOffload};
use stowage_store::{
    AsyncStoreConfig, BincodeCodec, ChainBuilder, ChainingStore, ConfigurationError,
    PurgeSummary, SingletonStoreConfig, Store, StoreConfig, StoreRegistry,
};

/// Registry serving the given stores by name, counting factory calls.
fn registry(stores: &[&MemoryStore], built: &Arc<AtomicUsize>) -> StoreRegistry {
    stores.iter().fold(StoreRegistry::new(), |registry, store| {
        let store = (*store).clone();
        let built = built.clone();
        let name = store.label().as_str().to_owned();
        registry.register(name, move |_config: &StoreConfig| {
            built.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(store.clone()) as Arc<dyn Store>)
        })
    })
}

fn build(stores: &[&MemoryStore], configs: Vec<StoreConfig>) -> ChainingStore {
    ChainBuilder::new(registry(stores, &Arc::default()), TokioOffload::default())
        .stores(configs)
        .build()
        .unwrap()
}

#[test]
fn test_multiple_state_transfer_sources_rejected_before_construction() {
    let a = MemoryStore::new("a");
    let b = MemoryStore::new("b");
    let built = Arc::new(AtomicUsize::new(0));

    let err = ChainBuilder::new(registry(&[&a, &b], &built), TokioOffload::default())
        .store(StoreConfig::new("a").fetch_persistent_state(true))
        .store(StoreConfig::new("b").fetch_persistent_state(true))
        .build()
        .unwrap_err();

    match err {
        ConfigurationError::MultipleStateTransferSources { first, second } => {
            assert_eq!(first, "a");
            assert_eq!(second, "b");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(built.load(Ordering::SeqCst), 0);
}

#[test]
fn test_shared_singleton_rejected() {
    let a = MemoryStore::new("a");
    let built = Arc::new(AtomicUsize::new(0));

    let err = ChainBuilder::new(registry(&[&a], &built), TokioOffload::default())
        .store(
            StoreConfig::new("a")
                .shared(true)
                .singleton_store(SingletonStoreConfig::enabled()),
        )
        .build()
        .unwrap_err();

    assert!(matches!(err, ConfigurationError::SingletonShared { .. }));
    assert_eq!(built.load(Ordering::SeqCst), 0);
}

#[test]
fn test_unknown_backend_rejected() {
    let err = ChainBuilder::new(StoreRegistry::new(), TokioOffload::default())
        .store(StoreConfig::new("nope"))
        .build()
        .unwrap_err();

    assert!(matches!(err, ConfigurationError::UnknownBackend(name) if name == "nope"));
}

#[test]
fn test_factory_failure_reported() {
    let registry = StoreRegistry::new().register("broken", |_config: &StoreConfig| {
        Err::<Arc<dyn Store>, BoxError>("cannot connect".into())
    });

    let err = ChainBuilder::new(registry, TokioOffload::default())
        .store(StoreConfig::new("broken"))
        .build()
        .unwrap_err();

    assert!(matches!(err, ConfigurationError::StoreCreation { .. }));
}

#[test]
fn test_decorators_applied_in_order() {
    let a = MemoryStore::new("a");
    let chain = build(
        &[&a],
        vec![
            StoreConfig::new("a")
                .async_store(AsyncStoreConfig::enabled())
                .ignore_modifications(true)
                .singleton_store(SingletonStoreConfig::enabled()),
        ],
    );

    let members = chain.chain_members();
    let member = &members[0];
    assert_eq!(
        member.store().label().as_str(),
        "singleton.read-only.write-behind.a"
    );
    assert_eq!(member.store_type(), std::any::type_name::<MemoryStore>());
    assert!(member.singleton().is_some());
}

#[tokio::test]
async fn test_load_first_hit_wins() {
    let a = MemoryStore::new("a");
    let b = MemoryStore::new("b");
    a.seed(StoreEntry::new("both", "from-a"));
    b.seed(StoreEntry::new("both", "from-b"));
    b.seed(StoreEntry::new("only-b", "from-b"));
    let chain = build(&[&a, &b], vec![StoreConfig::new("a"), StoreConfig::new("b")]);

    let both = chain.load(&EntryKey::new("both")).await.unwrap().unwrap();
    let only_b = chain.load(&EntryKey::new("only-b")).await.unwrap().unwrap();

    assert_eq!(&both.value()[..], b"from-a");
    assert_eq!(&only_b.value()[..], b"from-b");
    assert!(chain.load(&EntryKey::new("none")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_writes_fan_out() {
    let a = MemoryStore::new("a");
    let b = MemoryStore::new("b");
    let ro = MemoryStore::new("ro");
    let chain = build(
        &[&a, &b, &ro],
        vec![
            StoreConfig::new("a"),
            StoreConfig::new("b"),
            StoreConfig::new("ro").ignore_modifications(true),
        ],
    );

    chain.store(StoreEntry::new("k", "v")).await.unwrap();

    assert!(a.get("k").is_some());
    assert!(b.get("k").is_some());
    assert!(ro.is_empty());

    a.seed(StoreEntry::new("only-a", "v"));
    assert!(chain.remove(&EntryKey::new("only-a")).await.unwrap());
    assert!(!chain.remove(&EntryKey::new("missing")).await.unwrap());
}

#[tokio::test]
async fn test_first_write_failure_aborts_fan_out() {
    let a = MemoryStore::new("a");
    let b = MemoryStore::new("b");
    a.fail_writes(1);
    let chain = build(&[&a, &b], vec![StoreConfig::new("a"), StoreConfig::new("b")]);

    assert!(chain.store(StoreEntry::new("k", "v")).await.is_err());
    assert!(b.is_empty());
}

#[tokio::test]
async fn test_purge_continues_past_failure() {
    let a = MemoryStore::new("a");
    let b = MemoryStore::new("b");
    a.fail_purge(true);
    let chain = build(&[&a, &b], vec![StoreConfig::new("a"), StoreConfig::new("b")]);

    let summary = chain.purge_members().await;

    assert_eq!(summary, PurgeSummary { purged: 1, failed: 1 });
    assert_eq!(b.counters().purges.load(Ordering::SeqCst), 1);
    // Through the trait the failure is swallowed.
    chain.purge_expired().await.unwrap();
}

#[tokio::test]
async fn test_purge_if_necessary_clears_flagged_members() {
    let a = MemoryStore::new("a");
    let b = MemoryStore::new("b");
    a.seed(StoreEntry::new("k", "v"));
    b.seed(StoreEntry::new("k", "v"));
    let chain = build(
        &[&a, &b],
        vec![
            StoreConfig::new("a").purge_on_startup(true),
            StoreConfig::new("b"),
        ],
    );

    chain.purge_if_necessary().await.unwrap();

    assert!(a.is_empty());
    assert_eq!(b.len(), 1);
}

#[tokio::test]
async fn test_remove_store_type() {
    let a = MemoryStore::new("a");
    let b = MemoryStore::new("b");
    let chain = build(&[&a, &b], vec![StoreConfig::new("a"), StoreConfig::new("b")]);

    assert!(!chain.remove_store_type("a").await);
    assert_eq!(chain.len(), 1);
    assert_eq!(a.counters().stops.load(Ordering::SeqCst), 1);
    assert!(!chain.remove_store_type("unknown").await);
    assert!(chain.remove_store_type(std::any::type_name::<MemoryStore>()).await);
    assert!(chain.is_empty());
}

#[tokio::test]
async fn test_bulk_source_selection() {
    let source = MemoryStore::without_bulk("source");
    let bulk = MemoryStore::new("bulk");
    let chain = build(
        &[&source, &bulk],
        vec![
            StoreConfig::new("source").fetch_persistent_state(true),
            StoreConfig::new("bulk"),
        ],
    );
    assert_eq!(chain.bulk_source().unwrap().backend(), "bulk");
    assert_eq!(chain.state_transfer_source().unwrap().backend(), "source");

    let first = MemoryStore::new("first");
    let preferred = MemoryStore::new("preferred");
    let chain = build(
        &[&first, &preferred],
        vec![
            StoreConfig::new("first"),
            StoreConfig::new("preferred").fetch_persistent_state(true),
        ],
    );
    assert_eq!(chain.bulk_source().unwrap().backend(), "preferred");
}

#[tokio::test]
async fn test_lifecycle_and_coordinator_delivery() {
    let a = MemoryStore::new("a");
    let b = MemoryStore::new("b");
    let chain = build(
        &[&a, &b],
        vec![
            StoreConfig::new("a").singleton_store(
                SingletonStoreConfig::enabled().push_state_when_coordinator(false),
            ),
            StoreConfig::new("b"),
        ],
    );

    chain
        .init_members(Arc::new(RecordingCache::new()), Arc::new(BincodeCodec))
        .await
        .unwrap();
    chain.start().await.unwrap();
    assert_eq!(a.counters().inits.load(Ordering::SeqCst), 1);
    assert_eq!(b.counters().starts.load(Ordering::SeqCst), 1);

    chain.store(StoreEntry::new("k", "v")).await.unwrap();
    assert!(a.is_empty());

    chain
        .notify_coordinator(CoordinatorEvent::BecameCoordinator)
        .await
        .unwrap();
    chain.store(StoreEntry::new("k", "v")).await.unwrap();
    assert!(a.get("k").is_some());

    chain.stop().await.unwrap();
    assert_eq!(a.counters().stops.load(Ordering::SeqCst), 1);
    assert_eq!(b.counters().stops.load(Ordering::SeqCst), 1);
}
