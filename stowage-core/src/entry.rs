//! Store entries with expiration metadata.
//!
//! A [`StoreEntry`] is what travels between the cache and every store in the
//! chain: the key, the already-encoded value and the two timing attributes the
//! cache tracks for it.
//!
//! ## Lifespan vs max-idle
//!
//! - **Lifespan** - the entry expires a fixed time after it was created.
//! - **Max-idle** - the entry expires when it has not been used for that long.
//!
//! Either, both or neither may be set. Stores use [`StoreEntry::is_expired_at`]
//! when purging.
//!
//! ```
//! use std::time::Duration;
//! use stowage_core::StoreEntry;
//!
//! let entry = StoreEntry::new("session:1", "payload")
//!     .with_lifespan(Duration::from_secs(60));
//!
//! assert!(!entry.is_expired());
//! assert!(entry.expires_at().is_some());
//! ```

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntryKey, Raw};

/// A cache entry as handed to, and returned from, a store.
///
/// Identity is the key. Value and timing attributes are replaced wholesale on
/// every store call; there is no partial update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEntry {
    key: EntryKey,
    value: Raw,
    lifespan: Option<Duration>,
    max_idle: Option<Duration>,
    created: DateTime<Utc>,
    last_used: DateTime<Utc>,
}

impl StoreEntry {
    /// Creates an immortal entry created (and last used) now.
    pub fn new(key: impl Into<EntryKey>, value: impl Into<Raw>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            value: value.into(),
            lifespan: None,
            max_idle: None,
            created: now,
            last_used: now,
        }
    }

    /// Sets the lifespan.
    pub fn with_lifespan(mut self, lifespan: Duration) -> Self {
        self.lifespan = Some(lifespan);
        self
    }

    /// Sets the max-idle time.
    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = Some(max_idle);
        self
    }

    /// Overrides the creation and last-use timestamps.
    ///
    /// Used by stores that rebuild entries from persisted state.
    pub fn with_timestamps(mut self, created: DateTime<Utc>, last_used: DateTime<Utc>) -> Self {
        self.created = created;
        self.last_used = last_used;
        self
    }

    /// Returns the entry key.
    #[inline]
    pub fn key(&self) -> &EntryKey {
        &self.key
    }

    /// Returns the encoded value.
    #[inline]
    pub fn value(&self) -> &Raw {
        &self.value
    }

    /// Returns the lifespan, if any.
    #[inline]
    pub fn lifespan(&self) -> Option<Duration> {
        self.lifespan
    }

    /// Returns the max-idle time, if any.
    #[inline]
    pub fn max_idle(&self) -> Option<Duration> {
        self.max_idle
    }

    /// Returns when the entry was created.
    #[inline]
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Returns when the entry was last used.
    #[inline]
    pub fn last_used(&self) -> DateTime<Utc> {
        self.last_used
    }

    /// Returns the earliest instant at which either timing attribute expires.
    ///
    /// `None` means the entry never expires. Durations too large for chrono
    /// are treated as infinite.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let by_lifespan = self.lifespan.and_then(|d| deadline(self.created, d));
        let by_idle = self.max_idle.and_then(|d| deadline(self.last_used, d));
        match (by_lifespan, by_idle) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Returns `true` if the entry is expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| at <= now)
    }

    /// Returns `true` if the entry is expired at the current time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Splits the entry into its key and value.
    pub fn into_parts(self) -> (EntryKey, Raw) {
        (self.key, self.value)
    }
}

fn deadline(from: DateTime<Utc>, after: Duration) -> Option<DateTime<Utc>> {
    TimeDelta::from_std(after)
        .ok()
        .and_then(|delta| from.checked_add_signed(delta))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immortal_entry_never_expires() {
        let entry = StoreEntry::new("k", "v");
        assert_eq!(entry.expires_at(), None);
        assert!(!entry.is_expired_at(Utc::now() + TimeDelta::days(365)));
    }

    #[test]
    fn test_lifespan_expiry() {
        let created = Utc::now() - TimeDelta::seconds(10);
        let entry = StoreEntry::new("k", "v")
            .with_lifespan(Duration::from_secs(5))
            .with_timestamps(created, Utc::now());
        assert!(entry.is_expired());
    }

    #[test]
    fn test_max_idle_uses_last_used() {
        let now = Utc::now();
        let entry = StoreEntry::new("k", "v")
            .with_max_idle(Duration::from_secs(30))
            .with_timestamps(now - TimeDelta::hours(1), now);
        assert!(!entry.is_expired_at(now));
        assert!(entry.is_expired_at(now + TimeDelta::seconds(30)));
    }

    #[test]
    fn test_earliest_deadline_wins() {
        let now = Utc::now();
        let entry = StoreEntry::new("k", "v")
            .with_lifespan(Duration::from_secs(100))
            .with_max_idle(Duration::from_secs(10))
            .with_timestamps(now, now);
        assert_eq!(entry.expires_at(), Some(now + TimeDelta::seconds(10)));
    }

    #[test]
    fn test_huge_lifespan_is_infinite() {
        let entry = StoreEntry::new("k", "v").with_lifespan(Duration::MAX);
        assert_eq!(entry.expires_at(), None);
    }
}
