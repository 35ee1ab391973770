//! Metrics declaration and initialization.
//!
//! Store-level metrics (write-behind queues, per-store purge) live in
//! `stowage_store::metrics`; this module covers the loader manager and the
//! offload manager.

use std::time::Duration;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    // Loader manager metrics

    /// Track number of entries preloaded into the cache.
    pub static ref PRELOAD_ENTRIES: &'static str = {
        metrics::describe_counter!(
            "stowage_preload_entries_total",
            "Total number of entries preloaded from stores into the cache."
        );
        "stowage_preload_entries_total"
    };
    /// Histogram of preload duration.
    pub static ref PRELOAD_DURATION: &'static str = {
        metrics::describe_histogram!(
            "stowage_preload_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of cache preload in seconds."
        );
        "stowage_preload_duration_seconds"
    };
    /// Histogram of whole-chain purge duration.
    pub static ref PURGE_DURATION: &'static str = {
        metrics::describe_histogram!(
            "stowage_purge_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of expired-entry purge across the store chain in seconds."
        );
        "stowage_purge_duration_seconds"
    };

    // Offload manager metrics

    /// Track number of offload tasks spawned.
    pub static ref OFFLOAD_TASKS_SPAWNED: &'static str = {
        metrics::describe_counter!(
            "stowage_offload_tasks_spawned_total",
            "Total number of offload tasks spawned."
        );
        "stowage_offload_tasks_spawned_total"
    };
    /// Track number of offload tasks completed.
    pub static ref OFFLOAD_TASKS_COMPLETED: &'static str = {
        metrics::describe_counter!(
            "stowage_offload_tasks_completed_total",
            "Total number of offload tasks completed."
        );
        "stowage_offload_tasks_completed_total"
    };
    /// Track number of offload tasks that timed out.
    pub static ref OFFLOAD_TASKS_TIMEOUT: &'static str = {
        metrics::describe_counter!(
            "stowage_offload_tasks_timeout_total",
            "Total number of offload tasks that timed out."
        );
        "stowage_offload_tasks_timeout_total"
    };
    /// Gauge of currently active offload tasks.
    pub static ref OFFLOAD_TASKS_ACTIVE: &'static str = {
        metrics::describe_gauge!(
            "stowage_offload_tasks_active",
            "Number of currently active offload tasks."
        );
        "stowage_offload_tasks_active"
    };
    /// Histogram of offload task duration.
    pub static ref OFFLOAD_TASK_DURATION: &'static str = {
        metrics::describe_histogram!(
            "stowage_offload_task_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of offload tasks in seconds."
        );
        "stowage_offload_task_duration_seconds"
    };
}

/// Record a finished preload.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_preload(entries: usize, duration: Duration) {
    metrics::counter!(*PRELOAD_ENTRIES).increment(entries as u64);
    metrics::histogram!(*PRELOAD_DURATION).record(duration.as_secs_f64());
}

/// Record a finished preload (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_preload(_entries: usize, _duration: Duration) {}

/// Record a purge run across the chain.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_purge(duration: Duration) {
    metrics::histogram!(*PURGE_DURATION).record(duration.as_secs_f64());
}

/// Record a purge run (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_purge(_duration: Duration) {}

/// Record a spawned offload task.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_offload_spawned(kind: &str) {
    metrics::counter!(*OFFLOAD_TASKS_SPAWNED, "kind" => kind.to_string()).increment(1);
    metrics::gauge!(*OFFLOAD_TASKS_ACTIVE, "kind" => kind.to_string()).increment(1.0);
}

/// Record a spawned offload task (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_offload_spawned(_kind: &str) {}

/// Record a completed offload task.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_offload_completed(kind: &str, duration: Duration) {
    metrics::counter!(*OFFLOAD_TASKS_COMPLETED, "kind" => kind.to_string()).increment(1);
    metrics::gauge!(*OFFLOAD_TASKS_ACTIVE, "kind" => kind.to_string()).decrement(1.0);
    metrics::histogram!(*OFFLOAD_TASK_DURATION, "kind" => kind.to_string())
        .record(duration.as_secs_f64());
}

/// Record a completed offload task (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_offload_completed(_kind: &str, _duration: Duration) {}

/// Record an offload task cancelled by its timeout.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_offload_timeout(kind: &str, duration: Duration) {
    metrics::counter!(*OFFLOAD_TASKS_TIMEOUT, "kind" => kind.to_string()).increment(1);
    metrics::gauge!(*OFFLOAD_TASKS_ACTIVE, "kind" => kind.to_string()).decrement(1.0);
    metrics::histogram!(*OFFLOAD_TASK_DURATION, "kind" => kind.to_string())
        .record(duration.as_secs_f64());
}

/// Record a timed out offload task (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_offload_timeout(_kind: &str, _duration: Duration) {}
