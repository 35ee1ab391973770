use std::sync::Arc;

use async_trait::async_trait;
use stowage_core::{CacheHandle, EntryKey, StoreEntry, StoreLabel};

use crate::StoreError;
use crate::codec::EntryCodec;
use crate::config::StoreConfig;

pub type StoreResult<T> = Result<T, StoreError>;

/// Everything a store receives when it is initialized.
#[derive(Clone)]
pub struct StoreContext {
    config: StoreConfig,
    cache: Arc<dyn CacheHandle>,
    codec: Arc<dyn EntryCodec>,
}

impl StoreContext {
    pub fn new(config: StoreConfig, cache: Arc<dyn CacheHandle>, codec: Arc<dyn EntryCodec>) -> Self {
        Self {
            config,
            cache,
            codec,
        }
    }

    /// Configuration entry the store was built from.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The cache this store backs.
    pub fn cache(&self) -> &Arc<dyn CacheHandle> {
        &self.cache
    }

    /// Codec for stores that persist entries as bytes.
    pub fn codec(&self) -> &Arc<dyn EntryCodec> {
        &self.codec
    }
}

impl std::fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreContext")
            .field("config", &self.config)
            .field("codec", &self.codec)
            .finish()
    }
}

/// One-shot, finite iteration over every entry of a store.
///
/// Callers must [`close`](EntryCursor::close) the cursor once done, including
/// when iteration fails half way, so the store can release connections or
/// file handles.
#[async_trait]
pub trait EntryCursor: Send {
    /// Returns the next entry, `None` once exhausted.
    async fn next_entry(&mut self) -> StoreResult<Option<StoreEntry>>;

    /// Releases the resources held by the cursor.
    async fn close(&mut self) -> StoreResult<()>;
}

/// Cursor over entries already materialized in memory.
#[derive(Debug, Default)]
pub struct VecCursor {
    entries: std::vec::IntoIter<StoreEntry>,
}

impl VecCursor {
    pub fn new(entries: Vec<StoreEntry>) -> Self {
        Self {
            entries: entries.into_iter(),
        }
    }
}

#[async_trait]
impl EntryCursor for VecCursor {
    async fn next_entry(&mut self) -> StoreResult<Option<StoreEntry>> {
        Ok(self.entries.next())
    }

    async fn close(&mut self) -> StoreResult<()> {
        self.entries = Vec::new().into_iter();
        Ok(())
    }
}

/// Capability every pluggable store and every decorator implements.
#[async_trait]
pub trait Store: Send + Sync {
    /// Hands the store its configuration, the cache and the value codec.
    async fn init(&self, _ctx: &StoreContext) -> StoreResult<()> {
        Ok(())
    }

    async fn start(&self) -> StoreResult<()>;

    async fn stop(&self) -> StoreResult<()>;

    async fn load(&self, key: &EntryKey) -> StoreResult<Option<StoreEntry>>;

    async fn store(&self, entry: StoreEntry) -> StoreResult<()>;

    /// Removes `key`, returning whether it was present.
    async fn remove(&self, key: &EntryKey) -> StoreResult<bool>;

    async fn clear(&self) -> StoreResult<()>;

    async fn purge_expired(&self) -> StoreResult<()>;

    /// Whether [`bulk_load`](Self::bulk_load) is available.
    fn supports_bulk_load(&self) -> bool {
        false
    }

    /// Opens a cursor over every entry of the store.
    async fn bulk_load(&self) -> StoreResult<Box<dyn EntryCursor>> {
        Err(StoreError::BulkLoadUnsupported {
            store: self.label().as_str().into(),
        })
    }

    /// Returns the label of this store for logs and metrics.
    ///
    /// Decorators compose their own label with the wrapped store's,
    /// like "write-behind.jdbc".
    fn label(&self) -> StoreLabel {
        StoreLabel::new_static("store")
    }

    /// Type name of the undecorated store.
    ///
    /// Decorators forward to the store they wrap, so a chain can find members
    /// by backend type whatever decorators surround them.
    fn store_type(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

#[async_trait]
impl Store for &dyn Store {
    async fn init(&self, ctx: &StoreContext) -> StoreResult<()> {
        (*self).init(ctx).await
    }

    async fn start(&self) -> StoreResult<()> {
        (*self).start().await
    }

    async fn stop(&self) -> StoreResult<()> {
        (*self).stop().await
    }

    async fn load(&self, key: &EntryKey) -> StoreResult<Option<StoreEntry>> {
        (*self).load(key).await
    }

    async fn store(&self, entry: StoreEntry) -> StoreResult<()> {
        (*self).store(entry).await
    }

    async fn remove(&self, key: &EntryKey) -> StoreResult<bool> {
        (*self).remove(key).await
    }

    async fn clear(&self) -> StoreResult<()> {
        (*self).clear().await
    }

    async fn purge_expired(&self) -> StoreResult<()> {
        (*self).purge_expired().await
    }

    fn supports_bulk_load(&self) -> bool {
        (*self).supports_bulk_load()
    }

    async fn bulk_load(&self) -> StoreResult<Box<dyn EntryCursor>> {
        (*self).bulk_load().await
    }

    fn label(&self) -> StoreLabel {
        (*self).label()
    }

    fn store_type(&self) -> &str {
        (*self).store_type()
    }
}

#[async_trait]
impl Store for Box<dyn Store> {
    async fn init(&self, ctx: &StoreContext) -> StoreResult<()> {
        (**self).init(ctx).await
    }

    async fn start(&self) -> StoreResult<()> {
        (**self).start().await
    }

    async fn stop(&self) -> StoreResult<()> {
        (**self).stop().await
    }

    async fn load(&self, key: &EntryKey) -> StoreResult<Option<StoreEntry>> {
        (**self).load(key).await
    }

    async fn store(&self, entry: StoreEntry) -> StoreResult<()> {
        (**self).store(entry).await
    }

    async fn remove(&self, key: &EntryKey) -> StoreResult<bool> {
        (**self).remove(key).await
    }

    async fn clear(&self) -> StoreResult<()> {
        (**self).clear().await
    }

    async fn purge_expired(&self) -> StoreResult<()> {
        (**self).purge_expired().await
    }

    fn supports_bulk_load(&self) -> bool {
        (**self).supports_bulk_load()
    }

    async fn bulk_load(&self) -> StoreResult<Box<dyn EntryCursor>> {
        (**self).bulk_load().await
    }

    fn label(&self) -> StoreLabel {
        (**self).label()
    }

    fn store_type(&self) -> &str {
        (**self).store_type()
    }
}

#[async_trait]
impl Store for Arc<dyn Store> {
    async fn init(&self, ctx: &StoreContext) -> StoreResult<()> {
        (**self).init(ctx).await
    }

    async fn start(&self) -> StoreResult<()> {
        (**self).start().await
    }

    async fn stop(&self) -> StoreResult<()> {
        (**self).stop().await
    }

    async fn load(&self, key: &EntryKey) -> StoreResult<Option<StoreEntry>> {
        (**self).load(key).await
    }

    async fn store(&self, entry: StoreEntry) -> StoreResult<()> {
        (**self).store(entry).await
    }

    async fn remove(&self, key: &EntryKey) -> StoreResult<bool> {
        (**self).remove(key).await
    }

    async fn clear(&self) -> StoreResult<()> {
        (**self).clear().await
    }

    async fn purge_expired(&self) -> StoreResult<()> {
        (**self).purge_expired().await
    }

    fn supports_bulk_load(&self) -> bool {
        (**self).supports_bulk_load()
    }

    async fn bulk_load(&self) -> StoreResult<Box<dyn EntryCursor>> {
        (**self).bulk_load().await
    }

    fn label(&self) -> StoreLabel {
        (**self).label()
    }

    fn store_type(&self) -> &str {
        (**self).store_type()
    }
}
