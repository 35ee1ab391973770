//! Cluster-singleton decorator.
//!
//! Exactly one node of a cluster, the coordinator, may write to a singleton
//! store. The decorator does not decide who that is: the cluster layer
//! delivers [`CoordinatorEvent`]s and the decorator flips between active and
//! inactive accordingly. While inactive, writes succeed without reaching the
//! wrapped store. Reads pass through in both states.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use async_trait::async_trait;
use smol_str::SmolStr;
use stowage_core::{CacheHandle, CoordinatorEvent, EntryKey, StoreEntry, StoreLabel};

use crate::config::SingletonStoreConfig;
use crate::{EntryCursor, Store, StoreContext, StoreError, StoreResult};

struct Shared<S> {
    store: S,
    config: SingletonStoreConfig,
    label: SmolStr,
    active: AtomicBool,
    // Bumped on every delivered event, so a push that finishes after a
    // newer event does not activate the store.
    generation: AtomicU64,
    transition: Mutex<()>,
    cache: OnceLock<Arc<dyn CacheHandle>>,
}

/// Gates writes on whether this node is the cluster coordinator.
///
/// Cloning is cheap and every clone shares the activation state, so the
/// chain can keep a handle for event delivery while the decorator itself sits
/// in the chain as a store.
pub struct SingletonStore<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for SingletonStore<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<S> SingletonStore<S>
where
    S: Store,
{
    /// Wraps `store`, initially inactive.
    pub fn new(store: S, config: SingletonStoreConfig) -> Self {
        let label = SmolStr::from(store.label().as_str());
        Self {
            shared: Arc::new(Shared {
                store,
                config,
                label,
                active: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                transition: Mutex::new(()),
                cache: OnceLock::new(),
            }),
        }
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.shared.store
    }

    /// Whether this node currently owns writes to the store.
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Applies a coordinator status change.
    ///
    /// On [`BecameCoordinator`](CoordinatorEvent::BecameCoordinator) the cache
    /// contents are pushed into the wrapped store first (if configured); the
    /// store only becomes active once the push succeeded. On
    /// [`LostCoordinator`](CoordinatorEvent::LostCoordinator) the store is
    /// deactivated at once, without waiting for in-flight writes.
    pub async fn handle(&self, event: CoordinatorEvent) -> StoreResult<()> {
        let shared = &self.shared;
        let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        match event {
            CoordinatorEvent::LostCoordinator => {
                let _transition = shared.transition.lock().unwrap_or_else(PoisonError::into_inner);
                if shared.active.swap(false, Ordering::SeqCst) {
                    tracing::debug!(store = %shared.label, "singleton store deactivated");
                } else {
                    tracing::trace!(store = %shared.label, "singleton store already inactive");
                }
                Ok(())
            }
            CoordinatorEvent::BecameCoordinator => {
                if self.is_active() {
                    tracing::trace!(store = %shared.label, "singleton store already active");
                    return Ok(());
                }

                if shared.config.push_state_when_coordinator {
                    self.push_state(generation).await?;
                }

                let _transition = shared.transition.lock().unwrap_or_else(PoisonError::into_inner);
                if shared.generation.load(Ordering::SeqCst) == generation {
                    shared.active.store(true, Ordering::SeqCst);
                    tracing::debug!(store = %shared.label, "singleton store activated");
                } else {
                    tracing::debug!(
                        store = %shared.label,
                        "coordinator status changed during state push, staying inactive"
                    );
                }
                Ok(())
            }
        }
    }

    /// Pushes the cache contents into the wrapped store.
    ///
    /// Stops early once a newer event arrives, so nothing is written after a
    /// `LostCoordinator` and only the latest of concurrent elections pushes.
    async fn push_state(&self, generation: u64) -> StoreResult<()> {
        let shared = &self.shared;
        let Some(cache) = shared.cache.get() else {
            tracing::warn!(store = %shared.label, "singleton store not initialized, skipping state push");
            return Ok(());
        };

        let superseded = || shared.generation.load(Ordering::SeqCst) != generation;
        let push = async {
            let entries = cache.snapshot().await.map_err(StoreError::CacheError)?;
            let mut pushed = 0usize;
            for entry in entries {
                if superseded() {
                    return Ok((pushed, true));
                }
                if entry.is_expired() {
                    continue;
                }
                shared.store.store(entry).await?;
                pushed += 1;
            }
            Ok::<_, StoreError>((pushed, false))
        };

        let timeout = shared.config.push_state_timeout;
        match tokio::time::timeout(timeout, push).await {
            Ok(Ok((pushed, true))) => {
                tracing::debug!(store = %shared.label, pushed, "coordinator status changed, state push abandoned");
                Ok(())
            }
            Ok(Ok((pushed, false))) => {
                tracing::debug!(store = %shared.label, pushed, "pushed cache state into singleton store");
                Ok(())
            }
            Ok(Err(error)) => {
                tracing::error!(store = %shared.label, ?error, "pushing cache state failed");
                Err(error)
            }
            Err(_) => {
                tracing::error!(store = %shared.label, ?timeout, "pushing cache state timed out");
                Err(StoreError::PushStateTimeout {
                    store: shared.label.clone(),
                    timeout,
                })
            }
        }
    }
}

impl<S> fmt::Debug for SingletonStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonStore")
            .field("inner", &self.shared.label)
            .field("active", &self.shared.active.load(Ordering::SeqCst))
            .field("config", &self.shared.config)
            .finish()
    }
}

#[async_trait]
impl<S> Store for SingletonStore<S>
where
    S: Store + 'static,
{
    async fn init(&self, ctx: &StoreContext) -> StoreResult<()> {
        let _ = self.shared.cache.set(ctx.cache().clone());
        self.shared.store.init(ctx).await
    }

    async fn start(&self) -> StoreResult<()> {
        self.shared.store.start().await
    }

    async fn stop(&self) -> StoreResult<()> {
        self.shared.active.store(false, Ordering::SeqCst);
        self.shared.store.stop().await
    }

    async fn load(&self, key: &EntryKey) -> StoreResult<Option<StoreEntry>> {
        self.shared.store.load(key).await
    }

    async fn store(&self, entry: StoreEntry) -> StoreResult<()> {
        if !self.is_active() {
            tracing::trace!(key = %entry.key(), store = %self.shared.label, "singleton inactive: ignoring store");
            return Ok(());
        }
        self.shared.store.store(entry).await
    }

    async fn remove(&self, key: &EntryKey) -> StoreResult<bool> {
        if !self.is_active() {
            tracing::trace!(%key, store = %self.shared.label, "singleton inactive: ignoring remove");
            return Ok(false);
        }
        self.shared.store.remove(key).await
    }

    async fn clear(&self) -> StoreResult<()> {
        if !self.is_active() {
            tracing::trace!(store = %self.shared.label, "singleton inactive: ignoring clear");
            return Ok(());
        }
        self.shared.store.clear().await
    }

    async fn purge_expired(&self) -> StoreResult<()> {
        self.shared.store.purge_expired().await
    }

    fn supports_bulk_load(&self) -> bool {
        self.shared.store.supports_bulk_load()
    }

    async fn bulk_load(&self) -> StoreResult<Box<dyn EntryCursor>> {
        self.shared.store.bulk_load().await
    }

    fn label(&self) -> StoreLabel {
        StoreLabel::new_static("singleton").compose(&self.shared.store.label())
    }

    fn store_type(&self) -> &str {
        self.shared.store.store_type()
    }
}
