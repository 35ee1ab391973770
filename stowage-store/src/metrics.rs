//! Store metrics.
//!
//! Enable the `metrics` feature to record them; without it every `record_*`
//! function compiles to nothing.
//!
//! ## Naming Pattern
//!
//! - `stowage_write_behind_*_total` - write-behind queue counters
//! - `stowage_store_purge_*` - expired-entry purge metrics

use std::time::Duration;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Metric name for modifications accepted by a write-behind queue.
    pub static ref WRITE_BEHIND_ENQUEUED: &'static str = {
        metrics::describe_counter!(
            "stowage_write_behind_enqueued_total",
            "Total number of modifications accepted by write-behind queues."
        );
        "stowage_write_behind_enqueued_total"
    };

    /// Metric name for modifications applied to the wrapped store.
    pub static ref WRITE_BEHIND_APPLIED: &'static str = {
        metrics::describe_counter!(
            "stowage_write_behind_applied_total",
            "Total number of modifications applied by write-behind workers."
        );
        "stowage_write_behind_applied_total"
    };

    /// Metric name for modifications superseded before they were applied.
    pub static ref WRITE_BEHIND_COALESCED: &'static str = {
        metrics::describe_counter!(
            "stowage_write_behind_coalesced_total",
            "Total number of queued modifications superseded by a later one for the same key."
        );
        "stowage_write_behind_coalesced_total"
    };

    /// Metric name for modifications dropped after retries or on shutdown.
    pub static ref WRITE_BEHIND_DROPPED: &'static str = {
        metrics::describe_counter!(
            "stowage_write_behind_dropped_total",
            "Total number of modifications dropped by write-behind stores."
        );
        "stowage_write_behind_dropped_total"
    };

    /// Metric name for purge duration histogram.
    pub static ref PURGE_DURATION: &'static str = {
        metrics::describe_histogram!(
            "stowage_store_purge_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of expired-entry purge runs per store in seconds."
        );
        "stowage_store_purge_duration_seconds"
    };

    /// Metric name for failed purge runs.
    pub static ref PURGE_ERRORS: &'static str = {
        metrics::describe_counter!(
            "stowage_store_purge_errors_total",
            "Total number of failed expired-entry purge runs per store."
        );
        "stowage_store_purge_errors_total"
    };
}

// Write-behind metrics

/// Record modifications accepted by a write-behind queue.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_enqueued(store: &str) {
    metrics::counter!(*WRITE_BEHIND_ENQUEUED, "store" => store.to_string()).increment(1);
}

/// Record modifications accepted (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_enqueued(_store: &str) {}

/// Record a modification applied to the wrapped store.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_applied(store: &str) {
    metrics::counter!(*WRITE_BEHIND_APPLIED, "store" => store.to_string()).increment(1);
}

/// Record an applied modification (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_applied(_store: &str) {}

/// Record modifications superseded within a batch.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_coalesced(store: &str, count: usize) {
    metrics::counter!(*WRITE_BEHIND_COALESCED, "store" => store.to_string())
        .increment(count as u64);
}

/// Record coalesced modifications (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_coalesced(_store: &str, _count: usize) {}

/// Record dropped modifications.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_dropped(store: &str, count: usize) {
    metrics::counter!(*WRITE_BEHIND_DROPPED, "store" => store.to_string())
        .increment(count as u64);
}

/// Record dropped modifications (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_dropped(_store: &str, _count: usize) {}

// Purge metrics

/// Record one purge run of a store.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_purge(store: &str, duration: Duration, failed: bool) {
    metrics::histogram!(*PURGE_DURATION, "store" => store.to_string())
        .record(duration.as_secs_f64());
    if failed {
        metrics::counter!(*PURGE_ERRORS, "store" => store.to_string()).increment(1);
    }
}

/// Record a purge run (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_purge(_store: &str, _duration: Duration, _failed: bool) {}
