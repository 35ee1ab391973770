//! Store abstraction, decorators and the chaining store.
//!
//! This crate provides the [`Store`] trait every pluggable persistence
//! backend implements, the decorators that add behavior around a store
//! without touching it, and the [`ChainingStore`] a cache is backed by.
//!
//! # Store trait
//!
//! A store is an async, object-safe capability: lifecycle (`init`, `start`,
//! `stop`), point operations (`load`, `store`, `remove`, `clear`), expired
//! entry purge and, optionally, bulk iteration through an [`EntryCursor`] for
//! preload.
//!
//! # Decorators
//!
//! - [`WriteBehindStore`] - queues writes and applies them in the background
//! - [`ReadOnlyStore`] - suppresses every mutation
//! - [`SingletonStore`] - lets writes through only on the cluster coordinator
//!
//! # Chain
//!
//! [`ChainBuilder`] turns a list of [`StoreConfig`]s into a [`ChainingStore`],
//! constructing each backend through the [`StoreRegistry`] and wrapping it in
//! the configured decorators.
//!
//! # Feature flags
//!
//! - `metrics` - write-behind and purge metrics through the `metrics` crate
//! - `test-helpers` - [`testing::MemoryStore`], [`testing::RecordingCache`]
//!   and [`testing::TokioOffload`]

pub mod chain;
pub mod codec;
pub mod config;
pub mod decorator;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod store;
#[cfg(feature = "test-helpers")]
pub mod testing;

pub use chain::{ChainBuilder, ChainMember, ChainingStore, PurgeSummary};
pub use codec::{BincodeCodec, CodecError, CodecTypeId, EntryCodec, JsonCodec};
pub use config::{AsyncStoreConfig, SingletonStoreConfig, StoreConfig};
pub use decorator::{Modification, ReadOnlyStore, SingletonStore, WriteBehindStore};
pub use error::{ConfigurationError, StoreError};
pub use registry::{StoreFactory, StoreRegistry};
pub use store::{EntryCursor, Store, StoreContext, StoreResult, VecCursor};
