use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use smol_str::SmolStr;
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, warn};

use super::policy::{OffloadConfig, TimeoutPolicy};
use crate::metrics;

const PRUNE_INTERVAL: Duration = Duration::from_millis(50);

/// Identity of an offloaded task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OffloadKey {
    /// Kind of the task ("write-behind", "purge", "coordinator").
    pub kind: SmolStr,
    /// Unique within the manager.
    pub id: u64,
}

enum Outcome {
    Finished,
    TimedOut,
}

#[derive(Debug)]
struct Inner {
    config: OffloadConfig,
    tasks: DashMap<OffloadKey, JoinHandle<()>>,
    next_id: AtomicU64,
    settled: Notify,
}

impl Inner {
    fn settle(&self, key: &OffloadKey) {
        self.tasks.remove(key);
        self.settled.notify_waiters();
    }

    fn prune(&self) {
        self.tasks.retain(|_, handle| !handle.is_finished());
    }
}

/// Runs the background tasks of the persistence layer on tokio.
///
/// Every task is tracked until it settles, so the owner can wait for the
/// store chain's workers on shutdown or cancel whatever is left.
#[derive(Clone, Debug)]
pub struct OffloadManager {
    inner: Arc<Inner>,
}

impl OffloadManager {
    /// Creates a manager applying `config` to every task.
    pub fn new(config: OffloadConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                tasks: DashMap::new(),
                next_id: AtomicU64::new(0),
                settled: Notify::new(),
            }),
        }
    }

    /// Spawns `task` under the manager's timeout policy.
    pub fn spawn<F>(&self, kind: impl Into<SmolStr>, task: F) -> OffloadKey
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = OffloadKey {
            kind: kind.into(),
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
        };
        debug!(?key, "spawning offload task");
        metrics::record_offload_spawned(&key.kind);

        let span = info_span!("offload_task", kind = %key.kind, id = key.id);
        let policy = self.inner.config.timeout_policy;
        let inner = self.inner.clone();
        let tracked = key.clone();
        // The task waits until it is tracked, so it can never settle first.
        let (registered, wait_registered) = oneshot::channel::<()>();
        let handle = tokio::spawn(
            async move {
                let _ = wait_registered.await;
                let started = Instant::now();
                let outcome = supervise(policy, task).await;
                let elapsed = started.elapsed();
                match outcome {
                    Outcome::Finished => {
                        if let TimeoutPolicy::Warn(limit) = policy
                            && elapsed > limit
                        {
                            warn!(key = ?tracked, ?elapsed, ?limit, "offload task exceeded its time limit");
                        }
                        metrics::record_offload_completed(&tracked.kind, elapsed);
                    }
                    Outcome::TimedOut => {
                        warn!(key = ?tracked, ?elapsed, "offload task cancelled after time limit");
                        metrics::record_offload_timeout(&tracked.kind, elapsed);
                    }
                }
                inner.settle(&tracked);
            }
            .instrument(span),
        );
        self.inner.tasks.insert(key.clone(), handle);
        let _ = registered.send(());
        key
    }

    /// Number of tasks still running.
    pub fn active_task_count(&self) -> usize {
        self.inner
            .tasks
            .iter()
            .filter(|task| !task.is_finished())
            .count()
    }

    /// Number of running tasks of `kind`.
    pub fn active_tasks_of_kind(&self, kind: &str) -> usize {
        self.inner
            .tasks
            .iter()
            .filter(|task| task.key().kind == kind && !task.is_finished())
            .count()
    }

    /// Whether the task is still running.
    pub fn is_in_flight(&self, key: &OffloadKey) -> bool {
        self.inner
            .tasks
            .get(key)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Aborts one task. Returns `false` if it already settled.
    pub fn cancel(&self, key: &OffloadKey) -> bool {
        match self.inner.tasks.remove(key) {
            Some((_, handle)) => {
                handle.abort();
                self.inner.settled.notify_waiters();
                true
            }
            None => false,
        }
    }

    /// Aborts every task, returning how many were still running.
    pub fn cancel_all(&self) -> usize {
        let keys: Vec<OffloadKey> = self
            .inner
            .tasks
            .iter()
            .map(|task| task.key().clone())
            .collect();
        let cancelled = keys.iter().filter(|key| self.cancel(key)).count();
        if cancelled > 0 {
            debug!(cancelled, "cancelled offload tasks");
        }
        cancelled
    }

    /// Waits until every tracked task has settled.
    pub async fn wait_all(&self) {
        loop {
            let settled = self.inner.settled.notified();
            self.inner.prune();
            if self.inner.tasks.is_empty() {
                return;
            }
            // A panicked task never notifies; re-check its handle now and then.
            let _ = tokio::time::timeout(PRUNE_INTERVAL, settled).await;
        }
    }

    /// Waits up to `timeout` for every task to settle. Returns whether they did.
    pub async fn wait_all_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_all()).await.is_ok()
    }

    /// Gives running tasks `grace` to finish, then aborts the rest.
    ///
    /// Returns how many tasks had to be aborted.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        if self.wait_all_timeout(grace).await {
            return 0;
        }
        let aborted = self.cancel_all();
        warn!(aborted, ?grace, "offload tasks still running at shutdown, aborted");
        aborted
    }
}

impl Default for OffloadManager {
    fn default() -> Self {
        Self::new(OffloadConfig::default())
    }
}

impl stowage_core::Offload for OffloadManager {
    fn spawn<F>(&self, kind: impl Into<SmolStr>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        OffloadManager::spawn(self, kind, future);
    }
}

async fn supervise<F>(policy: TimeoutPolicy, task: F) -> Outcome
where
    F: Future<Output = ()>,
{
    match policy {
        TimeoutPolicy::Cancel(limit) => match tokio::time::timeout(limit, task).await {
            Ok(()) => Outcome::Finished,
            Err(_) => Outcome::TimedOut,
        },
        TimeoutPolicy::None | TimeoutPolicy::Warn(_) => {
            task.await;
            Outcome::Finished
        }
    }
}
