//! Read-only decorator.

use async_trait::async_trait;
use stowage_core::{EntryKey, StoreEntry, StoreLabel};

use crate::{EntryCursor, Store, StoreContext, StoreResult};

/// Suppresses every mutation of the wrapped store.
///
/// `store`, `remove` and `clear` succeed without touching the wrapped store
/// (`remove` reports the key as absent). Loads, bulk iteration, purge and
/// lifecycle calls pass through. Used for stores configured with
/// `ignore_modifications`.
#[derive(Clone)]
pub struct ReadOnlyStore<S> {
    inner: S,
}

impl<S> ReadOnlyStore<S>
where
    S: Store,
{
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S> std::fmt::Debug for ReadOnlyStore<S>
where
    S: Store,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadOnlyStore")
            .field("inner", &self.inner.label())
            .finish()
    }
}

#[async_trait]
impl<S> Store for ReadOnlyStore<S>
where
    S: Store,
{
    async fn init(&self, ctx: &StoreContext) -> StoreResult<()> {
        self.inner.init(ctx).await
    }

    async fn start(&self) -> StoreResult<()> {
        self.inner.start().await
    }

    async fn stop(&self) -> StoreResult<()> {
        self.inner.stop().await
    }

    async fn load(&self, key: &EntryKey) -> StoreResult<Option<StoreEntry>> {
        self.inner.load(key).await
    }

    async fn store(&self, entry: StoreEntry) -> StoreResult<()> {
        tracing::trace!(key = %entry.key(), store = %self.inner.label(), "read-only: ignoring store");
        Ok(())
    }

    async fn remove(&self, key: &EntryKey) -> StoreResult<bool> {
        tracing::trace!(%key, store = %self.inner.label(), "read-only: ignoring remove");
        Ok(false)
    }

    async fn clear(&self) -> StoreResult<()> {
        tracing::trace!(store = %self.inner.label(), "read-only: ignoring clear");
        Ok(())
    }

    async fn purge_expired(&self) -> StoreResult<()> {
        self.inner.purge_expired().await
    }

    fn supports_bulk_load(&self) -> bool {
        self.inner.supports_bulk_load()
    }

    async fn bulk_load(&self) -> StoreResult<Box<dyn EntryCursor>> {
        self.inner.bulk_load().await
    }

    fn label(&self) -> StoreLabel {
        StoreLabel::new_static("read-only").compose(&self.inner.label())
    }

    fn store_type(&self) -> &str {
        self.inner.store_type()
    }
}
