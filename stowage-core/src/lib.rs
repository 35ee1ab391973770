#![warn(missing_docs)]
//! # stowage-core
//!
//! Core types and collaborator contracts for the stowage persistence layer.
//!
//! A cache backed by external stores needs a shared vocabulary between the
//! store chain and the cache runtime around it. This crate provides it:
//!
//! - **Data** - [`EntryKey`] and [`StoreEntry`], the unit every store reads
//!   and writes
//! - **Cache** - [`CacheHandle`] with [`WriteFlags`], how the persistence
//!   layer writes into and reads from the cache
//! - **Transactions** - [`TransactionManager`] and the
//!   [`TransactionSuspension`] guard
//! - **Cluster** - [`CoordinatorEvent`] messages for singleton stores
//! - **Background work** - [`Offload`]

pub mod cache;
pub mod cluster;
pub mod entry;
pub mod key;
pub mod label;
pub mod offload;
pub mod transaction;

pub use cache::{CacheHandle, EvictionSettings, IndexingSettings, WriteFlags};
pub use cluster::CoordinatorEvent;
pub use entry::StoreEntry;
pub use key::EntryKey;
pub use label::StoreLabel;
pub use offload::Offload;
#[doc(hidden)]
pub use smol_str::SmolStr;
pub use transaction::{TransactionId, TransactionManager, TransactionSuspension};

/// Raw byte data type used for encoded entry values.
/// Using `Bytes` provides efficient zero-copy cloning via reference counting.
pub type Raw = bytes::Bytes;

/// Boxed error returned by collaborators the persistence layer does not own.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
