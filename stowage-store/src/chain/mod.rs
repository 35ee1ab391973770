//! Chaining store.
//!
//! A [`ChainingStore`] is the ordered set of (possibly decorated) stores a
//! cache is backed by. Loads go to the members in configured order and the
//! first hit wins. Writes fan out to every member.
//!
//! Members are built from configuration by the [`ChainBuilder`], which
//! enforces the chain invariants before any store is constructed:
//!
//! - at most one member fetches persistent state (the state-transfer source)
//! - a singleton store is never shared

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use stowage_core::{CacheHandle, CoordinatorEvent, EntryKey, StoreEntry, StoreLabel};

use crate::codec::EntryCodec;
use crate::config::StoreConfig;
use crate::decorator::SingletonStore;
use crate::metrics;
use crate::{EntryCursor, Store, StoreContext, StoreError, StoreResult};

mod builder;

pub use builder::ChainBuilder;

/// One store in the chain together with the configuration it was built from.
pub struct ChainMember {
    store: Arc<dyn Store>,
    config: StoreConfig,
    singleton: Option<SingletonStore<Arc<dyn Store>>>,
}

impl ChainMember {
    /// Creates a member from an already decorated store.
    ///
    /// `singleton` is the handle used to deliver coordinator events, when the
    /// store is wrapped in a [`SingletonStore`].
    pub fn new(
        store: Arc<dyn Store>,
        config: StoreConfig,
        singleton: Option<SingletonStore<Arc<dyn Store>>>,
    ) -> Self {
        Self {
            store,
            config,
            singleton,
        }
    }

    /// The decorated store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Backend name from the configuration.
    pub fn backend(&self) -> &str {
        &self.config.backend
    }

    /// Type name of the undecorated store.
    pub fn store_type(&self) -> &str {
        self.store.store_type()
    }

    pub fn is_state_transfer_source(&self) -> bool {
        self.config.fetch_persistent_state
    }

    pub fn is_shared(&self) -> bool {
        self.config.shared
    }

    pub fn purge_on_startup(&self) -> bool {
        self.config.purge_on_startup
    }

    /// Singleton handle, if the member is a singleton store.
    pub fn singleton(&self) -> Option<&SingletonStore<Arc<dyn Store>>> {
        self.singleton.as_ref()
    }

    fn matches(&self, store_type: &str) -> bool {
        self.store_type() == store_type || self.backend() == store_type
    }
}

impl fmt::Debug for ChainMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainMember")
            .field("store", &self.store.label())
            .field("store_type", &self.store_type())
            .field("config", &self.config)
            .finish()
    }
}

/// Outcome of one [`ChainingStore::purge_members`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    /// Members purged successfully.
    pub purged: usize,
    /// Members whose purge failed.
    pub failed: usize,
}

/// Ordered composite of stores.
#[derive(Default)]
pub struct ChainingStore {
    members: RwLock<Vec<Arc<ChainMember>>>,
}

impl ChainingStore {
    pub fn new(members: Vec<ChainMember>) -> Self {
        Self {
            members: RwLock::new(members.into_iter().map(Arc::new).collect()),
        }
    }

    // Snapshot so the lock is never held across an await.
    fn members(&self) -> Vec<Arc<ChainMember>> {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Undecorated type names of all members, in chain order.
    pub fn store_types(&self) -> Vec<String> {
        self.members()
            .iter()
            .map(|member| member.store_type().to_owned())
            .collect()
    }

    /// Members in chain order.
    pub fn chain_members(&self) -> Vec<Arc<ChainMember>> {
        self.members()
    }

    /// The member configured to fetch persistent state.
    pub fn state_transfer_source(&self) -> Option<Arc<ChainMember>> {
        self.members()
            .into_iter()
            .find(|member| member.is_state_transfer_source())
    }

    /// The member preload reads from.
    ///
    /// The state-transfer source if it supports bulk load, otherwise the
    /// first member that does.
    pub fn bulk_source(&self) -> Option<Arc<ChainMember>> {
        let members = self.members();
        members
            .iter()
            .find(|member| member.is_state_transfer_source() && member.store.supports_bulk_load())
            .or_else(|| members.iter().find(|member| member.store.supports_bulk_load()))
            .cloned()
    }

    /// Initializes every member with its own configuration entry.
    pub async fn init_members(
        &self,
        cache: Arc<dyn CacheHandle>,
        codec: Arc<dyn EntryCodec>,
    ) -> StoreResult<()> {
        for member in self.members() {
            let ctx = StoreContext::new(member.config.clone(), cache.clone(), codec.clone());
            member.store.init(&ctx).await?;
        }
        Ok(())
    }

    /// Clears every member configured to purge on startup.
    pub async fn purge_if_necessary(&self) -> StoreResult<()> {
        for member in self.members() {
            if member.purge_on_startup() {
                tracing::debug!(store = %member.store.label(), "purging store on startup");
                member.store.clear().await?;
            }
        }
        Ok(())
    }

    /// Purges expired entries from every member in turn.
    ///
    /// A failing member is logged and skipped.
    pub async fn purge_members(&self) -> PurgeSummary {
        let mut summary = PurgeSummary::default();
        for member in self.members() {
            let label = member.store.label();
            let started = Instant::now();
            let result = member.store.purge_expired().await;
            let elapsed = started.elapsed();
            metrics::record_purge(label.as_str(), elapsed, result.is_err());
            match result {
                Ok(()) => {
                    tracing::debug!(store = %label, ?elapsed, "purged expired entries");
                    summary.purged += 1;
                }
                Err(error) => {
                    tracing::error!(store = %label, ?elapsed, ?error, "purging expired entries failed");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    /// Removes every member whose undecorated type or backend name is
    /// `store_type`, stopping each removed store.
    ///
    /// Returns whether the chain is empty afterwards.
    pub async fn remove_store_type(&self, store_type: &str) -> bool {
        let (removed, empty) = {
            let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
            let (removed, kept): (Vec<_>, Vec<_>) = members
                .drain(..)
                .partition(|member| member.matches(store_type));
            *members = kept;
            (removed, members.is_empty())
        };

        for member in removed {
            tracing::debug!(store = %member.store.label(), "removing store from chain");
            if let Err(error) = member.store.stop().await {
                tracing::error!(store = %member.store.label(), ?error, "failed to stop removed store");
            }
        }
        empty
    }

    /// Delivers a coordinator event to every singleton member in order.
    pub async fn notify_coordinator(&self, event: CoordinatorEvent) -> StoreResult<()> {
        for member in self.members() {
            if let Some(singleton) = member.singleton() {
                tracing::debug!(store = %member.store.label(), %event, "delivering coordinator event");
                singleton.handle(event).await?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ChainingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainingStore")
            .field("members", &self.members())
            .finish()
    }
}

#[async_trait]
impl Store for ChainingStore {
    async fn init(&self, ctx: &StoreContext) -> StoreResult<()> {
        self.init_members(ctx.cache().clone(), ctx.codec().clone())
            .await
    }

    async fn start(&self) -> StoreResult<()> {
        for member in self.members() {
            tracing::debug!(store = %member.store.label(), "starting store");
            member.store.start().await?;
        }
        Ok(())
    }

    async fn stop(&self) -> StoreResult<()> {
        let mut first_error = None;
        for member in self.members() {
            tracing::debug!(store = %member.store.label(), "stopping store");
            if let Err(error) = member.store.stop().await {
                tracing::error!(store = %member.store.label(), ?error, "failed to stop store");
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn load(&self, key: &EntryKey) -> StoreResult<Option<StoreEntry>> {
        for member in self.members() {
            if let Some(entry) = member.store.load(key).await? {
                tracing::trace!(%key, store = %member.store.label(), "chain: load hit");
                return Ok(Some(entry));
            }
        }
        tracing::trace!(%key, "chain: load miss");
        Ok(None)
    }

    async fn store(&self, entry: StoreEntry) -> StoreResult<()> {
        for member in self.members() {
            if let Err(error) = member.store.store(entry.clone()).await {
                tracing::error!(key = %entry.key(), store = %member.store.label(), ?error, "chain: store failed");
                return Err(error);
            }
        }
        Ok(())
    }

    async fn remove(&self, key: &EntryKey) -> StoreResult<bool> {
        let mut removed = false;
        for member in self.members() {
            match member.store.remove(key).await {
                Ok(hit) => removed |= hit,
                Err(error) => {
                    tracing::error!(%key, store = %member.store.label(), ?error, "chain: remove failed");
                    return Err(error);
                }
            }
        }
        Ok(removed)
    }

    async fn clear(&self) -> StoreResult<()> {
        for member in self.members() {
            if let Err(error) = member.store.clear().await {
                tracing::error!(store = %member.store.label(), ?error, "chain: clear failed");
                return Err(error);
            }
        }
        Ok(())
    }

    async fn purge_expired(&self) -> StoreResult<()> {
        self.purge_members().await;
        Ok(())
    }

    fn supports_bulk_load(&self) -> bool {
        self.bulk_source().is_some()
    }

    async fn bulk_load(&self) -> StoreResult<Box<dyn EntryCursor>> {
        match self.bulk_source() {
            Some(member) => member.store.bulk_load().await,
            None => Err(StoreError::BulkLoadUnsupported {
                store: self.label().as_str().into(),
            }),
        }
    }

    fn label(&self) -> StoreLabel {
        StoreLabel::new_static("chain")
    }
}
