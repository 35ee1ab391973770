#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! # stowage
//!
//! Persistence for in-memory caches: a [`LoaderManager`] builds a chain of
//! pluggable stores from [`LoadersConfig`], keeps it running for the life of
//! the cache, preloads the cache from it on startup and purges expired
//! entries in the background.
//!
//! ```ignore
//! use std::sync::Arc;
//! use stowage::{LoaderManager, LoadersConfig, StoreConfig, StoreRegistry};
//!
//! let registry = StoreRegistry::new().register("file", |config: &StoreConfig| {
//!     Ok(Arc::new(FileStore::open(&config.properties["path"])?) as Arc<dyn Store>)
//! });
//! let config = LoadersConfig::from_yaml(include_str!("loaders.yaml"))?;
//!
//! let manager = LoaderManager::builder(cache)
//!     .config(config)
//!     .registry(registry)
//!     .build();
//! manager.start().await?;
//! manager.preload().await?;
//! ```
//!
//! # Feature flags
//!
//! - `metrics` - preload, purge, offload and write-behind metrics through the
//!   `metrics` crate

/// Loader configuration.
///
/// [`LoadersConfig`](config::LoadersConfig) carries the preload and
/// passivation switches, the purge interval and the ordered store list.
pub mod config;

/// Error types of the loader manager.
pub mod error;

/// The loader manager and its lifecycle.
pub mod manager;

/// Metrics collection for loader observability.
///
/// When the `metrics` feature is enabled, this module provides counters
/// and histograms for:
/// - Preloaded entries and preload duration
/// - Purge duration across the chain
/// - Offload task lifecycle
pub mod metrics;

/// Background task offloading.
///
/// The [`OffloadManager`](offload::OffloadManager) runs write-behind workers,
/// the periodic purge and the coordinator listener, and can wait for or
/// cancel them on shutdown.
pub mod offload;

pub use config::{LoadersConfig, LoadersConfigBuilder};
pub use error::{ConfigError, LoaderError};
pub use manager::{LoaderManager, LoaderManagerBuilder, ManagerState};
pub use offload::{OffloadConfig, OffloadManager, TimeoutPolicy};

pub use stowage_core::{
    CacheHandle, CoordinatorEvent, EntryKey, Offload, StoreEntry, TransactionManager, WriteFlags,
};
pub use stowage_store::{
    AsyncStoreConfig, ChainingStore, EntryCodec, SingletonStoreConfig, Store, StoreConfig,
    StoreError, StoreRegistry,
};
