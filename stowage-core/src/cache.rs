//! The cache as seen from the persistence layer.
//!
//! Stores never own cache entries. When they need to write into the cache
//! (preload) or read its current contents (singleton state push), they go
//! through [`CacheHandle`], which the cache runtime implements.

use async_trait::async_trait;

use crate::{BoxError, StoreEntry};

/// Bypass flags for a write issued by the persistence layer into the cache.
///
/// Preload inserts entries it has just read from a store, so it must not send
/// them back to the store chain, lock, or route them to another owner.
///
/// ```
/// use stowage_core::WriteFlags;
///
/// let flags = WriteFlags::state_insertion(false);
/// assert!(flags.skip_store);
/// assert!(flags.skip_indexing);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WriteFlags {
    /// Apply the write on this node only.
    pub local_only: bool,
    /// Do not check whether this node owns the key.
    pub skip_ownership_check: bool,
    /// The caller does not need the previous value.
    pub ignore_return_values: bool,
    /// Do not pass the write to the store chain.
    pub skip_store: bool,
    /// Do not acquire entry locks.
    pub skip_locking: bool,
    /// Do not update the query index.
    pub skip_indexing: bool,
}

impl WriteFlags {
    /// Flags for inserting state loaded from a store into the cache.
    ///
    /// Indexing is skipped unless `index` is set.
    pub const fn state_insertion(index: bool) -> Self {
        Self {
            local_only: true,
            skip_ownership_check: true,
            ignore_return_values: true,
            skip_store: true,
            skip_locking: true,
            skip_indexing: !index,
        }
    }
}

/// Eviction settings of the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionSettings {
    /// Whether an eviction strategy is active.
    pub enabled: bool,
    /// Maximum number of entries the cache holds when eviction is enabled.
    pub max_entries: usize,
}

impl EvictionSettings {
    /// Eviction enabled with the given capacity.
    pub const fn bounded(max_entries: usize) -> Self {
        Self {
            enabled: true,
            max_entries,
        }
    }

    /// Number of entries the cache can take, `usize::MAX` when unbounded.
    pub const fn capacity(&self) -> usize {
        if self.enabled {
            self.max_entries
        } else {
            usize::MAX
        }
    }
}

/// Indexing settings of the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexingSettings {
    /// Whether entries are indexed at all.
    pub enabled: bool,
    /// Whether each node indexes only what it writes locally.
    pub local_only: bool,
}

/// Handle to the cache a store chain is attached to.
#[async_trait]
pub trait CacheHandle: Send + Sync {
    /// Writes an entry into the cache honouring `flags`.
    async fn put(&self, entry: StoreEntry, flags: WriteFlags) -> Result<(), BoxError>;

    /// Returns the cache's current contents.
    async fn snapshot(&self) -> Result<Vec<StoreEntry>, BoxError>;

    /// Returns the cache's eviction settings.
    fn eviction(&self) -> EvictionSettings;

    /// Returns the cache's indexing settings.
    fn indexing(&self) -> IndexingSettings;

    /// Deactivates the cache's load and store interceptors.
    ///
    /// Called once the store chain has no members left.
    fn disable_store_interceptors(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_insertion_flags() {
        let flags = WriteFlags::state_insertion(true);
        assert!(flags.local_only);
        assert!(flags.skip_ownership_check);
        assert!(flags.skip_store);
        assert!(flags.skip_locking);
        assert!(!flags.skip_indexing);
    }

    #[test]
    fn test_capacity() {
        assert_eq!(EvictionSettings::bounded(3).capacity(), 3);
        assert_eq!(EvictionSettings::default().capacity(), usize::MAX);
    }
}
