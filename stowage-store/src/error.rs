//! Error types for store operations and chain construction.

use std::time::Duration;

use smol_str::SmolStr;
use stowage_core::BoxError;
use thiserror::Error;

use crate::codec::CodecError;

/// Error type for a single store operation.
///
/// Surfaced to the caller on synchronous paths (`load`, direct `store`,
/// `remove`, `clear`). The write-behind path retries and then drops, and
/// purge logs and skips.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Internal store error, state or computation error.
    ///
    /// Any error not related to talking to the external system.
    #[error(transparent)]
    InternalError(BoxError),

    /// Error talking to the external system behind the store.
    #[error(transparent)]
    ConnectionError(BoxError),

    /// Encoding or decoding an entry failed.
    #[error(transparent)]
    CodecError(#[from] CodecError),

    /// The cache rejected a write issued by the persistence layer.
    #[error("cache rejected the write: {0}")]
    CacheError(BoxError),

    /// The write-behind queue stayed full for longer than the offer timeout.
    #[error("write-behind queue of `{store}` is full (capacity {capacity})")]
    QueueFull {
        /// Label of the write-behind store.
        store: SmolStr,
        /// Configured queue capacity.
        capacity: usize,
    },

    /// The store no longer accepts operations.
    #[error("store `{store}` is stopped")]
    Stopped {
        /// Label of the stopped store.
        store: SmolStr,
    },

    /// Bulk iteration was requested from a store that cannot provide it.
    #[error("store `{store}` does not support bulk load")]
    BulkLoadUnsupported {
        /// Label of the store.
        store: SmolStr,
    },

    /// Pushing the cache contents into a singleton store did not finish in time.
    #[error("pushing state into `{store}` timed out after {timeout:?}")]
    PushStateTimeout {
        /// Label of the singleton store.
        store: SmolStr,
        /// Configured push timeout.
        timeout: Duration,
    },
}

impl StoreError {
    /// Wraps any error as an internal store error.
    pub fn internal(err: impl Into<BoxError>) -> Self {
        Self::InternalError(err.into())
    }

    /// Wraps any error as a connection error.
    pub fn connection(err: impl Into<BoxError>) -> Self {
        Self::ConnectionError(err.into())
    }
}

/// Invariant violation found while building a store chain.
///
/// Always fatal: cache startup aborts, nothing is silently downgraded.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// More than one store is configured to fetch persistent state.
    #[error(
        "only one store may fetch persistent state, but both `{first}` and `{second}` are configured to"
    )]
    MultipleStateTransferSources {
        /// Backend of the first state-transfer source.
        first: SmolStr,
        /// Backend of the second state-transfer source.
        second: SmolStr,
    },

    /// A store is configured both as a singleton store and as shared.
    #[error(
        "store `{backend}` is configured as a singleton store, so it cannot be shared in a cluster"
    )]
    SingletonShared {
        /// Backend of the offending store.
        backend: SmolStr,
    },

    /// No factory is registered for the configured backend.
    #[error("no store factory registered for backend `{0}`")]
    UnknownBackend(SmolStr),

    /// The registered factory failed to construct the store.
    #[error("failed to create store for backend `{backend}`")]
    StoreCreation {
        /// Backend whose factory failed.
        backend: SmolStr,
        /// Factory error.
        #[source]
        source: BoxError,
    },
}
