//! Test helpers: an in-memory store, a recording cache and a tokio offload.
//!
//! Available with the `test-helpers` feature.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use smol_str::SmolStr;
use stowage_core::{
    BoxError, CacheHandle, EntryKey, EvictionSettings, IndexingSettings, Offload, StoreEntry,
    StoreLabel, WriteFlags,
};

use crate::{EntryCursor, Store, StoreContext, StoreError, StoreResult};

/// Operation counters of a [`MemoryStore`].
#[derive(Debug, Default)]
pub struct OpCounters {
    pub inits: AtomicUsize,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub loads: AtomicUsize,
    pub stores: AtomicUsize,
    pub removes: AtomicUsize,
    pub clears: AtomicUsize,
    pub purges: AtomicUsize,
    pub cursors_opened: AtomicUsize,
    pub cursors_closed: AtomicUsize,
}

impl OpCounters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct Faults {
    fail_writes: AtomicUsize,
    fail_start: AtomicBool,
    fail_purge: AtomicBool,
    fail_cursor_after: Mutex<Option<usize>>,
    write_delay: Mutex<Option<Duration>>,
}

#[derive(Debug)]
struct MemoryInner {
    name: SmolStr,
    entries: DashMap<EntryKey, StoreEntry>,
    bulk: bool,
    counters: Arc<OpCounters>,
    faults: Faults,
}

/// In-memory store backed by a `DashMap`.
///
/// Clones share state, so a test can keep a handle while the chain owns
/// another.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl MemoryStore {
    /// Creates an empty store with bulk load support.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self::build(name.into(), true)
    }

    /// Creates an empty store without bulk load support.
    pub fn without_bulk(name: impl Into<SmolStr>) -> Self {
        Self::build(name.into(), false)
    }

    fn build(name: SmolStr, bulk: bool) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                name,
                entries: DashMap::new(),
                bulk,
                counters: Arc::default(),
                faults: Faults::default(),
            }),
        }
    }

    /// Inserts an entry directly, bypassing counters and faults.
    pub fn seed(&self, entry: StoreEntry) {
        self.inner.entries.insert(entry.key().clone(), entry);
    }

    /// Returns the stored entry for `key`.
    pub fn get(&self, key: &str) -> Option<StoreEntry> {
        self.inner.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn counters(&self) -> &OpCounters {
        &self.inner.counters
    }

    /// Fails the next `count` writes (`store`, `remove`, `clear`).
    pub fn fail_writes(&self, count: usize) {
        self.inner.faults.fail_writes.store(count, Ordering::SeqCst);
    }

    /// Makes `start` fail.
    pub fn fail_start(&self, fail: bool) {
        self.inner.faults.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Makes `purge_expired` fail.
    pub fn fail_purge(&self, fail: bool) {
        self.inner.faults.fail_purge.store(fail, Ordering::SeqCst);
    }

    /// Makes bulk cursors fail after yielding `count` entries.
    pub fn fail_cursor_after(&self, count: usize) {
        *self
            .inner
            .faults
            .fail_cursor_after
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(count);
    }

    /// Delays every write by `delay`.
    pub fn write_delay(&self, delay: Duration) {
        *self
            .inner
            .faults
            .write_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(delay);
    }

    async fn before_write(&self) -> StoreResult<()> {
        let delay = *self
            .inner
            .faults
            .write_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .inner
            .faults
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::connection(format!(
                "injected write failure in `{}`",
                self.inner.name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn init(&self, _ctx: &StoreContext) -> StoreResult<()> {
        OpCounters::bump(&self.inner.counters.inits);
        Ok(())
    }

    async fn start(&self) -> StoreResult<()> {
        OpCounters::bump(&self.inner.counters.starts);
        if self.inner.faults.fail_start.load(Ordering::SeqCst) {
            return Err(StoreError::connection("injected start failure"));
        }
        Ok(())
    }

    async fn stop(&self) -> StoreResult<()> {
        OpCounters::bump(&self.inner.counters.stops);
        Ok(())
    }

    async fn load(&self, key: &EntryKey) -> StoreResult<Option<StoreEntry>> {
        OpCounters::bump(&self.inner.counters.loads);
        Ok(self.get(key.as_str()))
    }

    async fn store(&self, entry: StoreEntry) -> StoreResult<()> {
        OpCounters::bump(&self.inner.counters.stores);
        self.before_write().await?;
        self.inner.entries.insert(entry.key().clone(), entry);
        Ok(())
    }

    async fn remove(&self, key: &EntryKey) -> StoreResult<bool> {
        OpCounters::bump(&self.inner.counters.removes);
        self.before_write().await?;
        Ok(self.inner.entries.remove(key).is_some())
    }

    async fn clear(&self) -> StoreResult<()> {
        OpCounters::bump(&self.inner.counters.clears);
        self.before_write().await?;
        self.inner.entries.clear();
        Ok(())
    }

    async fn purge_expired(&self) -> StoreResult<()> {
        OpCounters::bump(&self.inner.counters.purges);
        if self.inner.faults.fail_purge.load(Ordering::SeqCst) {
            return Err(StoreError::internal("injected purge failure"));
        }
        self.inner.entries.retain(|_, entry| !entry.is_expired());
        Ok(())
    }

    fn supports_bulk_load(&self) -> bool {
        self.inner.bulk
    }

    async fn bulk_load(&self) -> StoreResult<Box<dyn EntryCursor>> {
        if !self.inner.bulk {
            return Err(StoreError::BulkLoadUnsupported {
                store: self.inner.name.clone(),
            });
        }
        OpCounters::bump(&self.inner.counters.cursors_opened);
        let mut entries: Vec<StoreEntry> = self
            .inner
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by(|a, b| a.key().cmp(b.key()));
        let fail_after = *self
            .inner
            .faults
            .fail_cursor_after
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(Box::new(MemoryCursor {
            entries: entries.into_iter(),
            yielded: 0,
            fail_after,
            counters: self.inner.counters.clone(),
        }))
    }

    fn label(&self) -> StoreLabel {
        StoreLabel::new(self.inner.name.clone())
    }
}

struct MemoryCursor {
    entries: std::vec::IntoIter<StoreEntry>,
    yielded: usize,
    fail_after: Option<usize>,
    counters: Arc<OpCounters>,
}

#[async_trait]
impl EntryCursor for MemoryCursor {
    async fn next_entry(&mut self) -> StoreResult<Option<StoreEntry>> {
        if self.fail_after.is_some_and(|limit| self.yielded >= limit) {
            return Err(StoreError::connection("injected cursor failure"));
        }
        let next = self.entries.next();
        if next.is_some() {
            self.yielded += 1;
        }
        Ok(next)
    }

    async fn close(&mut self) -> StoreResult<()> {
        OpCounters::bump(&self.counters.cursors_closed);
        Ok(())
    }
}

/// A [`CacheHandle`] that keeps entries in a map and records write flags.
#[derive(Debug, Default)]
pub struct RecordingCache {
    entries: DashMap<EntryKey, StoreEntry>,
    flags: Mutex<Vec<WriteFlags>>,
    eviction: EvictionSettings,
    indexing: IndexingSettings,
    fail_puts_after: Option<usize>,
    interceptors_disabled: AtomicBool,
}

impl RecordingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_eviction(self, eviction: EvictionSettings) -> Self {
        Self { eviction, ..self }
    }

    pub fn with_indexing(self, indexing: IndexingSettings) -> Self {
        Self { indexing, ..self }
    }

    /// Rejects every `put` after the first `count`.
    pub fn fail_puts_after(self, count: usize) -> Self {
        Self {
            fail_puts_after: Some(count),
            ..self
        }
    }

    /// Inserts an entry directly, without recording flags.
    pub fn insert(&self, entry: StoreEntry) {
        self.entries.insert(entry.key().clone(), entry);
    }

    pub fn get(&self, key: &str) -> Option<StoreEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flags of every accepted `put`, in order.
    pub fn recorded_flags(&self) -> Vec<WriteFlags> {
        self.flags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn interceptors_disabled(&self) -> bool {
        self.interceptors_disabled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheHandle for RecordingCache {
    async fn put(&self, entry: StoreEntry, flags: WriteFlags) -> Result<(), BoxError> {
        let mut recorded = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
        if self.fail_puts_after.is_some_and(|limit| recorded.len() >= limit) {
            return Err("injected cache put failure".into());
        }
        recorded.push(flags);
        drop(recorded);
        self.entries.insert(entry.key().clone(), entry);
        Ok(())
    }

    async fn snapshot(&self) -> Result<Vec<StoreEntry>, BoxError> {
        Ok(self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn eviction(&self) -> EvictionSettings {
        self.eviction
    }

    fn indexing(&self) -> IndexingSettings {
        self.indexing
    }

    fn disable_store_interceptors(&self) {
        self.interceptors_disabled.store(true, Ordering::SeqCst);
    }
}

/// [`Offload`] that spawns onto the ambient tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct TokioOffload {
    spawned: Arc<AtomicUsize>,
}

impl TokioOffload {
    /// Number of tasks spawned through this offload and its clones.
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

impl Offload for TokioOffload {
    fn spawn<F>(&self, _kind: impl Into<SmolStr>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(future);
    }
}
