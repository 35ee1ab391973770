//! Ambient transaction suspension.
//!
//! Store bootstrap I/O must never join a container-managed transaction that
//! happens to be active on the thread starting the cache. The manager wraps
//! chain startup in a [`TransactionSuspension`], which resumes the suspended
//! transaction when dropped, on success and failure alike.

use std::fmt;
use std::sync::Arc;

/// Opaque identifier of a suspended transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Suspend/resume pair of the ambient transaction manager.
pub trait TransactionManager: Send + Sync {
    /// Detaches the transaction bound to the current execution context.
    ///
    /// Returns `None` when no transaction is active.
    fn suspend(&self) -> Option<TransactionId>;

    /// Re-attaches a previously suspended transaction.
    fn resume(&self, tx: TransactionId);
}

/// Scope guard that keeps the ambient transaction suspended while alive.
///
/// ```
/// use std::sync::Arc;
/// use stowage_core::{TransactionId, TransactionManager, TransactionSuspension};
///
/// struct NoTx;
/// impl TransactionManager for NoTx {
///     fn suspend(&self) -> Option<TransactionId> { None }
///     fn resume(&self, _tx: TransactionId) {}
/// }
///
/// let manager: Arc<dyn TransactionManager> = Arc::new(NoTx);
/// let guard = TransactionSuspension::suspend(Some(&manager));
/// assert!(guard.suspended().is_none());
/// ```
#[must_use = "the transaction is resumed as soon as the guard is dropped"]
pub struct TransactionSuspension {
    manager: Option<Arc<dyn TransactionManager>>,
    suspended: Option<TransactionId>,
}

impl TransactionSuspension {
    /// Suspends the ambient transaction, if there is a manager and a transaction.
    pub fn suspend(manager: Option<&Arc<dyn TransactionManager>>) -> Self {
        let suspended = manager.and_then(|m| m.suspend());
        Self {
            manager: manager.cloned(),
            suspended,
        }
    }

    /// Returns the suspended transaction, if any.
    pub fn suspended(&self) -> Option<TransactionId> {
        self.suspended
    }
}

impl Drop for TransactionSuspension {
    fn drop(&mut self) {
        if let (Some(manager), Some(tx)) = (self.manager.as_ref(), self.suspended.take()) {
            manager.resume(tx);
        }
    }
}

impl fmt::Debug for TransactionSuspension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionSuspension")
            .field("suspended", &self.suspended)
            .finish()
    }
}
