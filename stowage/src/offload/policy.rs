//! Timeout policy of offloaded tasks.

use std::time::Duration;

/// What happens to a background task that runs longer than a limit.
///
/// Applies to every task of a manager. Write-behind workers and the periodic
/// purge live as long as the store chain, so a manager running them should
/// use [`TimeoutPolicy::None`] or [`TimeoutPolicy::Warn`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Tasks run until they finish.
    #[default]
    None,
    /// Tasks are cancelled once they exceed the limit.
    Cancel(Duration),
    /// Tasks run to completion; exceeding the limit is logged.
    Warn(Duration),
}

impl TimeoutPolicy {
    /// The limit, if any.
    pub fn limit(&self) -> Option<Duration> {
        match *self {
            Self::None => None,
            Self::Cancel(limit) | Self::Warn(limit) => Some(limit),
        }
    }
}

/// Configuration of an [`OffloadManager`](super::OffloadManager).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffloadConfig {
    /// Timeout policy for spawned tasks.
    pub timeout_policy: TimeoutPolicy,
}

impl OffloadConfig {
    /// Cancel tasks running longer than `limit`.
    pub fn cancel_after(limit: Duration) -> Self {
        Self {
            timeout_policy: TimeoutPolicy::Cancel(limit),
        }
    }

    /// Log a warning for tasks running longer than `limit`.
    pub fn warn_after(limit: Duration) -> Self {
        Self {
            timeout_policy: TimeoutPolicy::Warn(limit),
        }
    }
}
