//! Offload trait for background task execution.
//!
//! Write-behind stores and the loader manager run long-lived work (queue
//! draining, periodic purge, coordinator listeners) in the background. They
//! spawn it through [`Offload`] so the runtime policy stays with the caller.

use std::future::Future;

use smol_str::SmolStr;

/// Trait for spawning background tasks.
///
/// # Clone bound
///
/// Implementors should use `Arc` internally so that every clone shares the
/// same configuration and state.
///
/// # Example
///
/// ```ignore
/// use stowage_core::Offload;
///
/// fn drain_later<O: Offload>(offload: &O) {
///     offload.spawn("write-behind", async move {
///         // drain the queue
///     });
/// }
/// ```
pub trait Offload: Send + Sync + Clone + 'static {
    /// Spawn a future to be executed in the background.
    ///
    /// * `kind` - label categorizing the task (e.g. "write-behind", "purge"),
    ///   used for metrics and tracing.
    /// * `future` - the work; `Send + 'static` since it may run on another thread.
    fn spawn<F>(&self, kind: impl Into<SmolStr>, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
