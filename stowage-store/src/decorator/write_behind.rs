//! Write-behind decorator.
//!
//! Writes are accepted into a bounded queue and applied to the wrapped store
//! by a single background worker. Reads always go to the wrapped store, never
//! to the queue.
//!
//! ## Batching
//!
//! The worker waits for the first queued modification, gives the queue
//! `flush_interval` to fill up, then takes everything available as one batch.
//! Within a batch modifications coalesce per key: the last one wins and keeps
//! the position of the first. A `Clear` drops everything queued before it.
//!
//! ## Shutdown
//!
//! `stop` closes the queue and waits up to `shutdown_timeout` for the worker
//! to drain it. On timeout the worker is aborted and whatever is still queued
//! is discarded with a warning. The wrapped store is only stopped once the
//! worker has exited. A worker cancelled from outside, e.g. by the offload
//! running it, loses its unflushed modifications; `stop` reports those too.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use smol_str::SmolStr;
use stowage_core::{EntryKey, Offload, StoreEntry, StoreLabel};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::config::AsyncStoreConfig;
use crate::metrics;
use crate::{EntryCursor, Store, StoreContext, StoreError, StoreResult};

const RETRY_BACKOFF: Duration = Duration::from_millis(10);
const ABORT_WAIT: Duration = Duration::from_secs(1);

/// A queued write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    /// Store the entry.
    Store(StoreEntry),
    /// Remove the key.
    Remove(EntryKey),
    /// Clear the whole store.
    Clear,
}

/// Coalesced modifications taken from the queue in one go.
#[derive(Debug, Default)]
struct Batch {
    clear: bool,
    pending: IndexMap<EntryKey, Modification>,
    received: usize,
}

impl Batch {
    fn push(&mut self, modification: Modification) {
        self.received += 1;
        match modification {
            Modification::Clear => {
                self.pending.clear();
                self.clear = true;
            }
            Modification::Store(entry) => {
                self.pending
                    .insert(entry.key().clone(), Modification::Store(entry));
            }
            Modification::Remove(key) => {
                self.pending.insert(key.clone(), Modification::Remove(key));
            }
        }
    }

    fn len(&self) -> usize {
        self.pending.len() + usize::from(self.clear)
    }

    fn coalesced(&self) -> usize {
        self.received - self.len()
    }

    fn into_modifications(self) -> impl Iterator<Item = Modification> {
        self.clear
            .then_some(Modification::Clear)
            .into_iter()
            .chain(self.pending.into_values())
    }
}

struct WorkerHandle {
    done: oneshot::Receiver<()>,
    abort: oneshot::Sender<()>,
}

/// Applies queued writes to the wrapped store in the background.
///
/// Generic over the [`Offload`] that runs the drain worker, like the rest of
/// the background machinery.
pub struct WriteBehindStore<S, O>
where
    S: Store + 'static,
    O: Offload,
{
    inner: Arc<S>,
    offload: O,
    config: AsyncStoreConfig,
    label: SmolStr,
    sender: RwLock<Option<mpsc::Sender<Modification>>>,
    receiver: Mutex<Option<mpsc::Receiver<Modification>>>,
    worker: Mutex<Option<WorkerHandle>>,
    // Accepted but not yet applied (or dropped after retries).
    unflushed: Arc<AtomicUsize>,
}

impl<S, O> WriteBehindStore<S, O>
where
    S: Store + 'static,
    O: Offload,
{
    pub fn new(inner: S, offload: O, config: AsyncStoreConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.get());
        let label = SmolStr::from(inner.label().as_str());
        Self {
            inner: Arc::new(inner),
            offload,
            config,
            label,
            sender: RwLock::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            worker: Mutex::new(None),
            unflushed: Arc::default(),
        }
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns the write-behind settings.
    pub fn config(&self) -> &AsyncStoreConfig {
        &self.config
    }

    /// Number of modifications currently waiting in the queue.
    pub fn pending(&self) -> usize {
        self.sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|sender| sender.max_capacity() - sender.capacity())
            .unwrap_or_default()
    }

    /// Number of accepted modifications the worker has not applied yet,
    /// including those still in the queue.
    ///
    /// Anything left here after [`stop`](Store::stop) was lost.
    pub fn unflushed(&self) -> usize {
        self.unflushed.load(Ordering::SeqCst)
    }

    async fn enqueue(&self, modification: Modification) -> StoreResult<()> {
        let sender = self
            .sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(sender) = sender else {
            return Err(self.stopped());
        };

        // Counted before sending, so the worker never settles it first.
        self.unflushed.fetch_add(1, Ordering::SeqCst);
        let result = self.send(&sender, modification).await;
        match &result {
            Ok(()) => metrics::record_enqueued(&self.label),
            Err(_) => {
                self.unflushed.fetch_sub(1, Ordering::SeqCst);
            }
        }
        result
    }

    async fn send(
        &self,
        sender: &mpsc::Sender<Modification>,
        modification: Modification,
    ) -> StoreResult<()> {
        let modification = match sender.try_send(modification) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Closed(_)) => return Err(self.stopped()),
            Err(TrySendError::Full(modification)) => modification,
        };

        tracing::trace!(store = %self.label, "write-behind queue full, waiting");
        let sent = match self.config.offer_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, sender.send(modification)).await {
                Ok(sent) => sent,
                Err(_) => {
                    return Err(StoreError::QueueFull {
                        store: self.label.clone(),
                        capacity: self.config.queue_capacity.get(),
                    });
                }
            },
            None => sender.send(modification).await,
        };
        sent.map_err(|_| self.stopped())
    }

    fn stopped(&self) -> StoreError {
        StoreError::Stopped {
            store: self.label.clone(),
        }
    }
}

impl<S, O> fmt::Debug for WriteBehindStore<S, O>
where
    S: Store + 'static,
    O: Offload,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteBehindStore")
            .field("inner", &self.label)
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl<S, O> Store for WriteBehindStore<S, O>
where
    S: Store + 'static,
    O: Offload,
{
    async fn init(&self, ctx: &StoreContext) -> StoreResult<()> {
        self.inner.init(ctx).await
    }

    async fn start(&self) -> StoreResult<()> {
        self.inner.start().await?;

        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(receiver) = receiver else {
            tracing::debug!(store = %self.label, "write-behind worker already started");
            return Ok(());
        };

        let (done_tx, done_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = oneshot::channel();
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(WorkerHandle {
            done: done_rx,
            abort: abort_tx,
        });

        let worker = Worker {
            inner: self.inner.clone(),
            receiver,
            config: self.config.clone(),
            label: self.label.clone(),
            unflushed: self.unflushed.clone(),
        };
        self.offload
            .spawn("write-behind", worker.run(abort_rx, done_tx));
        tracing::debug!(store = %self.label, "write-behind worker started");
        Ok(())
    }

    async fn stop(&self) -> StoreResult<()> {
        // Dropping our sender closes the queue once in-flight producers finish.
        let closed = self
            .sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if closed.is_none() {
            tracing::trace!(store = %self.label, "write-behind store already stopped");
        }
        drop(closed);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match worker {
            Some(WorkerHandle { mut done, abort }) => {
                match tokio::time::timeout(self.config.shutdown_timeout, &mut done).await {
                    Ok(Ok(())) => {
                        tracing::debug!(store = %self.label, "write-behind queue drained");
                    }
                    Ok(Err(_)) => {
                        // The worker future was dropped without finishing.
                        let lost = self.unflushed();
                        tracing::warn!(
                            store = %self.label,
                            lost,
                            "write-behind worker ended without draining the queue"
                        );
                        if lost > 0 {
                            metrics::record_dropped(&self.label, lost);
                        }
                    }
                    Err(_) => {
                        tracing::warn!(
                            store = %self.label,
                            timeout = ?self.config.shutdown_timeout,
                            "write-behind queue not drained in time, aborting worker"
                        );
                        let _ = abort.send(());
                        if tokio::time::timeout(ABORT_WAIT, done).await.is_err() {
                            tracing::warn!(
                                store = %self.label,
                                "write-behind worker did not exit after abort"
                            );
                        }
                    }
                }
            }
            None => {
                // Never started: nothing will ever drain what was queued.
                let receiver = self
                    .receiver
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(mut receiver) = receiver {
                    receiver.close();
                    let discarded = discard(&mut receiver);
                    if discarded > 0 {
                        tracing::warn!(
                            store = %self.label,
                            discarded,
                            "write-behind store stopped before start, discarding queued modifications"
                        );
                        metrics::record_dropped(&self.label, discarded);
                    }
                }
            }
        }

        self.inner.stop().await
    }

    async fn load(&self, key: &EntryKey) -> StoreResult<Option<StoreEntry>> {
        self.inner.load(key).await
    }

    async fn store(&self, entry: StoreEntry) -> StoreResult<()> {
        tracing::trace!(key = %entry.key(), store = %self.label, "write-behind: enqueue store");
        self.enqueue(Modification::Store(entry)).await
    }

    async fn remove(&self, key: &EntryKey) -> StoreResult<bool> {
        tracing::trace!(%key, store = %self.label, "write-behind: enqueue remove");
        self.enqueue(Modification::Remove(key.clone())).await?;
        // The outcome is only known once the worker applies it.
        Ok(false)
    }

    async fn clear(&self) -> StoreResult<()> {
        tracing::trace!(store = %self.label, "write-behind: enqueue clear");
        self.enqueue(Modification::Clear).await
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
        StoreLabel::new_static("write-behind").compose(&self.inner.label())
    }

    fn store_type(&self) -> &str {
        self.inner.store_type()
    }
}

struct Worker<S> {
    inner: Arc<S>,
    receiver: mpsc::Receiver<Modification>,
    config: AsyncStoreConfig,
    label: SmolStr,
    unflushed: Arc<AtomicUsize>,
}

impl<S> Worker<S>
where
    S: Store + 'static,
{
    async fn run(mut self, mut abort: oneshot::Receiver<()>, done: oneshot::Sender<()>) {
        loop {
            let first = tokio::select! {
                biased;
                _ = &mut abort => {
                    self.abandon(0);
                    return;
                }
                received = self.receiver.recv() => received,
            };
            // Queue closed and empty.
            let Some(first) = first else { break };

            let mut batch = Batch::default();
            batch.push(first);

            if !self.config.flush_interval.is_zero() && !self.receiver.is_closed() {
                tokio::select! {
                    biased;
                    _ = &mut abort => {
                        self.abandon(batch.len());
                        return;
                    }
                    _ = tokio::time::sleep(self.config.flush_interval) => {}
                }
            }
            while let Ok(modification) = self.receiver.try_recv() {
                batch.push(modification);
            }

            if let Err(unapplied) = self.apply(batch, &mut abort).await {
                self.abandon(unapplied);
                return;
            }
        }

        tracing::trace!(store = %self.label, "write-behind worker finished");
        let _ = done.send(());
    }

    /// Applies a batch, returning how many modifications were left unapplied
    /// if the worker got aborted half way.
    async fn apply(&self, batch: Batch, abort: &mut oneshot::Receiver<()>) -> Result<(), usize> {
        let coalesced = batch.coalesced();
        if coalesced > 0 {
            tracing::trace!(store = %self.label, coalesced, "write-behind: coalesced modifications");
            metrics::record_coalesced(&self.label, coalesced);
            self.unflushed.fetch_sub(coalesced, Ordering::SeqCst);
        }
        tracing::trace!(store = %self.label, size = batch.len(), "write-behind: applying batch");

        let mut modifications = batch.into_modifications();
        while let Some(modification) = modifications.next() {
            tokio::select! {
                biased;
                _ = &mut *abort => return Err(1 + modifications.count()),
                () = self.apply_one(modification) => {
                    self.unflushed.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }
        Ok(())
    }

    async fn apply_one(&self, modification: Modification) {
        let mut attempt = 0;
        loop {
            let result = match &modification {
                Modification::Store(entry) => self.inner.store(entry.clone()).await,
                Modification::Remove(key) => self.inner.remove(key).await.map(|_| ()),
                Modification::Clear => self.inner.clear().await,
            };
            match result {
                Ok(()) => {
                    metrics::record_applied(&self.label);
                    return;
                }
                Err(error) if attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::debug!(store = %self.label, attempt, ?error, "write-behind: retrying modification");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(error) => {
                    tracing::warn!(
                        store = %self.label,
                        attempts = attempt + 1,
                        ?error,
                        ?modification,
                        "write-behind: dropping modification"
                    );
                    metrics::record_dropped(&self.label, 1);
                    return;
                }
            }
        }
    }

    fn abandon(&mut self, unapplied: usize) {
        self.receiver.close();
        let discarded = unapplied + discard(&mut self.receiver);
        tracing::warn!(
            store = %self.label,
            discarded,
            "write-behind worker aborted, discarding unflushed modifications"
        );
        metrics::record_dropped(&self.label, discarded);
    }
}

fn discard(receiver: &mut mpsc::Receiver<Modification>) -> usize {
    let mut discarded = 0;
    while receiver.try_recv().is_ok() {
        discarded += 1;
    }
    discarded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_last_writer_wins_in_first_position() {
        let mut batch = Batch::default();
        batch.push(Modification::Store(StoreEntry::new("a", "1")));
        batch.push(Modification::Store(StoreEntry::new("b", "1")));
        batch.push(Modification::Store(StoreEntry::new("a", "2")));

        assert_eq!(batch.coalesced(), 1);
        let applied: Vec<_> = batch.into_modifications().collect();
        assert_eq!(applied.len(), 2);
        match &applied[0] {
            Modification::Store(entry) => {
                assert_eq!(entry.key().as_str(), "a");
                assert_eq!(&entry.value()[..], b"2");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_batch_clear_supersedes_earlier() {
        let mut batch = Batch::default();
        batch.push(Modification::Store(StoreEntry::new("a", "1")));
        batch.push(Modification::Remove(EntryKey::new("b")));
        batch.push(Modification::Clear);
        batch.push(Modification::Store(StoreEntry::new("c", "1")));

        let applied: Vec<_> = batch.into_modifications().collect();
        assert_eq!(applied[0], Modification::Clear);
        assert_eq!(applied.len(), 2);
    }
}
