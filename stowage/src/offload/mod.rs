//! Offload manager for background task execution.
//!
//! Write-behind workers, the periodic purge and the coordinator listener run
//! as background tasks. The loader manager spawns them through an
//! [`OffloadManager`] by default, which keeps track of every task so they can
//! be awaited or cancelled on shutdown.
//!
//! # Example
//!
//! ```ignore
//! use stowage::offload::{OffloadConfig, OffloadManager};
//!
//! let offload = OffloadManager::new(OffloadConfig::warn_after(Duration::from_secs(30)));
//! offload.spawn("purge", async {
//!     // purge expired entries
//! });
//! // on shutdown
//! offload.shutdown(Duration::from_secs(5)).await;
//! ```

mod manager;
mod policy;

pub use manager::{OffloadKey, OffloadManager};
pub use policy::{OffloadConfig, TimeoutPolicy};
