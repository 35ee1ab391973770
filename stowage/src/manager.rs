//! Loader manager.
//!
//! The [`LoaderManager`] owns the store chain of one cache for the cache's
//! whole lifetime:
//!
//! ```text
//! Disabled ──start──▶ Starting ──▶ Started ──stop──▶ Stopped
//!                                    │
//!                                    └──last store disabled──▶ Disabled
//! ```
//!
//! - **start** builds the chain from configuration, initializes it, then
//!   starts it and applies purge-on-startup with the ambient transaction
//!   suspended
//! - **preload** fills the cache from the chain's bulk-capable store, bounded
//!   by the cache's eviction capacity
//! - **purge_expired** asks every store to drop expired entries; it runs on a
//!   timer when `purge_interval` is configured
//! - **disable_store** removes stores of one type at runtime
//! - **stop** stops the chain

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};

use stowage_core::{
    CacheHandle, CoordinatorEvent, Offload, TransactionManager, TransactionSuspension, WriteFlags,
};
use stowage_store::{
    BincodeCodec, ChainBuilder, ChainingStore, EntryCodec, EntryCursor, Store, StoreError,
    StoreRegistry, StoreResult,
};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::config::LoadersConfig;
use crate::error::LoaderError;
use crate::metrics;
use crate::offload::{OffloadConfig, OffloadManager};

/// Lifecycle state of a [`LoaderManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManagerState {
    /// No chain: nothing configured, not started yet, or every store disabled.
    #[default]
    Disabled,
    /// The chain is being built and started.
    Starting,
    /// The chain is running.
    Started,
    /// The chain has been stopped.
    Stopped,
}

/// State shared with background tasks.
struct Shared {
    cache: Arc<dyn CacheHandle>,
    state: RwLock<ManagerState>,
    chain: RwLock<Option<Arc<ChainingStore>>>,
    // A purge task only runs while this matches the epoch it was spawned with.
    purge_epoch: AtomicU64,
}

impl Shared {
    fn state(&self) -> ManagerState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ManagerState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn chain(&self) -> Option<Arc<ChainingStore>> {
        self.chain
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_chain(&self, chain: Option<Arc<ChainingStore>>) -> Option<Arc<ChainingStore>> {
        std::mem::replace(
            &mut *self.chain.write().unwrap_or_else(PoisonError::into_inner),
            chain,
        )
    }

    async fn purge_expired(&self) {
        if self.state() != ManagerState::Started {
            return;
        }
        let Some(chain) = self.chain() else {
            return;
        };
        let started = Instant::now();
        let summary = chain.purge_members().await;
        let elapsed = started.elapsed();
        metrics::record_purge(elapsed);
        trace!(
            purged = summary.purged,
            failed = summary.failed,
            ?elapsed,
            "purged expired entries from store chain"
        );
    }

    async fn on_coordinator_event(&self, event: CoordinatorEvent) -> Result<(), LoaderError> {
        let Some(chain) = self.chain() else {
            debug!(%event, "no store chain, ignoring coordinator event");
            return Ok(());
        };
        chain.notify_coordinator(event).await?;
        Ok(())
    }
}

/// Builds, starts, preloads, purges and stops the store chain of a cache.
///
/// Lifecycle methods are meant to be called by a single owner (the cache
/// runtime). [`purge_expired`](Self::purge_expired) may run concurrently with
/// cache traffic.
pub struct LoaderManager<O = OffloadManager>
where
    O: Offload,
{
    config: Option<LoadersConfig>,
    registry: StoreRegistry,
    offload: O,
    codec: Arc<dyn EntryCodec>,
    transactions: Option<Arc<dyn TransactionManager>>,
    shared: Arc<Shared>,
}

impl LoaderManager<OffloadManager> {
    /// Create a new builder for the manager of `cache`.
    pub fn builder(cache: Arc<dyn CacheHandle>) -> LoaderManagerBuilder<OffloadManager> {
        LoaderManagerBuilder::new(cache)
    }
}

impl<O> LoaderManager<O>
where
    O: Offload,
{
    /// Builds and starts the store chain.
    ///
    /// Does nothing when no stores are configured. The chain is initialized
    /// first; starting it and purging stores configured with
    /// `purge_on_startup` happens with the ambient transaction suspended.
    /// The transaction is resumed on every exit path.
    pub async fn start(&self) -> Result<(), LoaderError> {
        let Some(config) = self.config.as_ref().filter(|config| !config.stores.is_empty())
        else {
            debug!("no stores configured, loader manager stays disabled");
            return Ok(());
        };
        if self.state() == ManagerState::Started {
            return Ok(());
        }
        self.shared.set_state(ManagerState::Starting);

        let chain = match ChainBuilder::new(self.registry.clone(), self.offload.clone())
            .stores(config.stores.iter().cloned())
            .build()
        {
            Ok(chain) => Arc::new(chain),
            Err(err) => {
                error!(error = %err, "invalid store chain configuration");
                self.shared.set_state(ManagerState::Disabled);
                return Err(err.into());
            }
        };

        if let Err(err) = chain
            .init_members(self.shared.cache.clone(), self.codec.clone())
            .await
        {
            error!(error = ?err, "failed to initialize store chain");
            self.shared.set_state(ManagerState::Disabled);
            return Err(LoaderError::Start(err));
        }

        let started = {
            let suspension = TransactionSuspension::suspend(self.transactions.as_ref());
            if let Some(tx) = suspension.suspended() {
                trace!(%tx, "suspended ambient transaction for store chain start");
            }
            async {
                chain.start().await?;
                chain.purge_if_necessary().await
            }
            .await
        };

        if let Err(err) = started {
            error!(error = ?err, "failed to start store chain");
            if let Err(stop_err) = chain.stop().await {
                warn!(error = ?stop_err, "failed to stop partially started store chain");
            }
            self.shared.set_state(ManagerState::Disabled);
            return Err(LoaderError::Start(err));
        }

        debug!(stores = chain.len(), "store chain started");
        self.shared.replace_chain(Some(chain));
        self.shared.set_state(ManagerState::Started);

        if let Some(interval) = config.purge_interval {
            self.spawn_purge_task(interval);
        }
        Ok(())
    }

    /// Loads the cache from the chain's bulk-capable store.
    ///
    /// Returns the number of entries inserted. Nothing happens unless preload
    /// is configured, the manager is started and some store supports bulk
    /// load. The cursor is closed whether loading succeeds or not.
    pub async fn preload(&self) -> Result<usize, LoaderError> {
        if !self.config.as_ref().is_some_and(|config| config.preload) {
            return Ok(0);
        }
        if self.state() != ManagerState::Started {
            return Ok(0);
        }
        let Some(chain) = self.shared.chain() else {
            return Ok(0);
        };
        let Some(source) = chain.bulk_source() else {
            debug!("no store supports bulk load, skipping preload");
            return Ok(0);
        };

        let cache = &self.shared.cache;
        let max_entries = cache.eviction().capacity();
        let indexing = cache.indexing();
        let flags =
            WriteFlags::state_insertion(source.is_shared() && indexing.enabled && indexing.local_only);

        let started = Instant::now();
        let mut cursor = source
            .store()
            .bulk_load()
            .await
            .map_err(LoaderError::Preload)?;
        let loaded = fill(cache.as_ref(), cursor.as_mut(), max_entries, flags).await;
        let closed = cursor.close().await;

        let loaded = match (loaded, closed) {
            (Ok(loaded), Ok(())) => loaded,
            (Ok(_), Err(err)) => return Err(LoaderError::Preload(err)),
            (Err(err), closed) => {
                if let Err(close_err) = closed {
                    warn!(error = ?close_err, "failed to close preload cursor");
                }
                error!(error = ?err, "preload failed");
                return Err(LoaderError::Preload(err));
            }
        };

        let elapsed = started.elapsed();
        metrics::record_preload(loaded, elapsed);
        debug!(
            loaded,
            store = %source.store().label(),
            ?elapsed,
            "preloaded cache from store"
        );
        Ok(loaded)
    }

    /// Purges expired entries from every store.
    ///
    /// A no-op unless started. Failures are logged, never returned.
    pub async fn purge_expired(&self) {
        self.shared.purge_expired().await;
    }

    /// Removes every store whose type (or backend name) is `store_type`.
    ///
    /// When the last store goes, the cache's store interceptors are disabled
    /// and the manager becomes [`ManagerState::Disabled`]. Unknown types are
    /// ignored.
    pub async fn disable_store(&self, store_type: &str) {
        let Some(chain) = self.shared.chain() else {
            return;
        };
        let before = chain.len();
        let empty = chain.remove_store_type(store_type).await;
        if chain.len() == before {
            debug!(store_type, "no store of this type in the chain");
            return;
        }
        debug!(store_type, removed = before - chain.len(), "disabled store");

        if empty {
            debug!("store chain empty, disabling store interceptors");
            self.shared.cache.disable_store_interceptors();
            self.shared.replace_chain(None);
            self.shared.set_state(ManagerState::Disabled);
        }
    }

    /// Stops the chain. Idempotent.
    pub async fn stop(&self) -> Result<(), LoaderError> {
        let Some(chain) = self.shared.replace_chain(None) else {
            return Ok(());
        };
        self.shared.set_state(ManagerState::Stopped);
        self.shared.purge_epoch.fetch_add(1, Ordering::SeqCst);
        debug!("stopping store chain");
        chain.stop().await?;
        Ok(())
    }

    /// Clears every store in the chain.
    pub async fn clear_stores(&self) -> Result<(), LoaderError> {
        if let Some(chain) = self.shared.chain() {
            chain.clear().await?;
        }
        Ok(())
    }

    /// Runs [`purge_expired`](Self::purge_expired) every `interval` in the
    /// background until the manager leaves [`ManagerState::Started`].
    ///
    /// Replaces a purge task spawned earlier, which exits on its next tick.
    pub fn spawn_purge_task(&self, interval: Duration) {
        if interval.is_zero() {
            warn!("purge interval is zero, periodic purge disabled");
            return;
        }
        let epoch = self.shared.purge_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let shared = Arc::downgrade(&self.shared);
        self.offload
            .spawn("purge", purge_periodically(shared, epoch, interval));
        debug!(?interval, "periodic purge scheduled");
    }

    /// Delivers a coordinator status change to the chain's singleton stores.
    pub async fn on_coordinator_event(&self, event: CoordinatorEvent) -> Result<(), LoaderError> {
        self.shared.on_coordinator_event(event).await
    }

    /// Delivers every coordinator event received on `events` in the
    /// background, until the channel closes or the manager is dropped.
    pub fn listen_coordinator(&self, mut events: mpsc::Receiver<CoordinatorEvent>) {
        let shared = Arc::downgrade(&self.shared);
        self.offload.spawn("coordinator", async move {
            while let Some(event) = events.recv().await {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                if let Err(err) = shared.on_coordinator_event(event).await {
                    error!(%event, error = ?err, "failed to apply coordinator event");
                }
            }
            trace!("coordinator listener finished");
        });
    }

    /// Whether the chain is running.
    pub fn is_enabled(&self) -> bool {
        self.state() == ManagerState::Started
    }

    /// Whether the cache passivates to the stores. Always `false` when disabled.
    pub fn is_using_passivation(&self) -> bool {
        self.is_enabled() && self.config.as_ref().is_some_and(|config| config.passivation)
    }

    /// Whether any store in the chain is shared across the cluster.
    pub fn is_shared(&self) -> bool {
        self.shared
            .chain()
            .is_some_and(|chain| chain.chain_members().iter().any(|member| member.is_shared()))
    }

    /// Whether a store in the chain supplies persistent state on join.
    pub fn is_fetch_persistent_state(&self) -> bool {
        self.shared
            .chain()
            .is_some_and(|chain| chain.state_transfer_source().is_some())
    }

    /// Undecorated type names of the stores in the chain.
    pub fn store_types(&self) -> Vec<String> {
        self.shared
            .chain()
            .map(|chain| chain.store_types())
            .unwrap_or_default()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ManagerState {
        self.shared.state()
    }

    /// The running chain, for the cache's load and store interceptors.
    pub fn chain(&self) -> Option<Arc<ChainingStore>> {
        self.shared.chain()
    }

    /// The offload background tasks run on.
    pub fn offload(&self) -> &O {
        &self.offload
    }

    /// The configuration the manager was built with.
    pub fn config(&self) -> Option<&LoadersConfig> {
        self.config.as_ref()
    }
}

impl<O> std::fmt::Debug for LoaderManager<O>
where
    O: Offload,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderManager")
            .field("state", &self.state())
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("codec", &self.codec)
            .finish()
    }
}

async fn fill(
    cache: &dyn CacheHandle,
    cursor: &mut dyn EntryCursor,
    max_entries: usize,
    flags: WriteFlags,
) -> StoreResult<usize> {
    let mut loaded = 0;
    while loaded < max_entries {
        let Some(entry) = cursor.next_entry().await? else {
            break;
        };
        cache
            .put(entry, flags)
            .await
            .map_err(StoreError::CacheError)?;
        loaded += 1;
    }
    Ok(loaded)
}

async fn purge_periodically(shared: Weak<Shared>, epoch: u64, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        if shared.state() != ManagerState::Started
            || shared.purge_epoch.load(Ordering::SeqCst) != epoch
        {
            break;
        }
        shared.purge_expired().await;
    }
    trace!("periodic purge finished");
}

/// Builder for [`LoaderManager`].
pub struct LoaderManagerBuilder<O> {
    cache: Arc<dyn CacheHandle>,
    config: Option<LoadersConfig>,
    registry: StoreRegistry,
    offload: O,
    codec: Arc<dyn EntryCodec>,
    transactions: Option<Arc<dyn TransactionManager>>,
}

impl LoaderManagerBuilder<OffloadManager> {
    /// Create a builder with the default offload manager and bincode codec.
    pub fn new(cache: Arc<dyn CacheHandle>) -> Self {
        Self {
            cache,
            config: None,
            registry: StoreRegistry::new(),
            offload: OffloadManager::default(),
            codec: Arc::new(BincodeCodec),
            transactions: None,
        }
    }

    /// Run background tasks on an [`OffloadManager`] built from `config`.
    pub fn offload_config(self, config: OffloadConfig) -> Self {
        self.offload(OffloadManager::new(config))
    }
}

impl<O> LoaderManagerBuilder<O>
where
    O: Offload,
{
    /// Set the loader configuration.
    pub fn config(self, config: LoadersConfig) -> Self {
        Self {
            config: Some(config),
            ..self
        }
    }

    /// Set the registry the chain's stores are built from.
    pub fn registry(self, registry: StoreRegistry) -> Self {
        Self { registry, ..self }
    }

    /// Set the codec handed to stores.
    pub fn codec(self, codec: Arc<dyn EntryCodec>) -> Self {
        Self { codec, ..self }
    }

    /// Set the ambient transaction manager.
    pub fn transaction_manager(self, transactions: Arc<dyn TransactionManager>) -> Self {
        Self {
            transactions: Some(transactions),
            ..self
        }
    }

    /// Set the offload background tasks are spawned on.
    pub fn offload<O2>(self, offload: O2) -> LoaderManagerBuilder<O2>
    where
        O2: Offload,
    {
        LoaderManagerBuilder {
            cache: self.cache,
            config: self.config,
            registry: self.registry,
            offload,
            codec: self.codec,
            transactions: self.transactions,
        }
    }

    /// Build the manager. Nothing is constructed until [`LoaderManager::start`].
    pub fn build(self) -> LoaderManager<O> {
        LoaderManager {
            config: self.config,
            registry: self.registry,
            offload: self.offload,
            codec: self.codec,
            transactions: self.transactions,
            shared: Arc::new(Shared {
                cache: self.cache,
                state: RwLock::new(ManagerState::Disabled),
                chain: RwLock::new(None),
                purge_epoch: AtomicU64::new(0),
            }),
        }
    }
}
