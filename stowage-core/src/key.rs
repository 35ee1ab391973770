//! Entry key type.
//!
//! `EntryKey` is a newtype around `SmolStr`: short keys (up to 23 bytes) live
//! inline, longer ones are reference counted, so cloning a key for a queue
//! entry or a fan-out never copies the key bytes.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::borrow::Borrow;
use std::fmt;

/// Identity of a cached entry as seen by every store in a chain.
///
/// # Example
/// ```
/// use stowage_core::EntryKey;
///
/// let key = EntryKey::new("user:42");
/// assert_eq!(key.as_str(), "user:42");
/// assert_eq!(key, EntryKey::from("user:42"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryKey(SmolStr);

impl EntryKey {
    /// Creates a new entry key.
    #[inline]
    pub fn new(s: impl Into<SmolStr>) -> Self {
        Self(s.into())
    }

    /// Creates an entry key from a static string (no allocation).
    #[inline]
    pub const fn new_static(s: &'static str) -> Self {
        Self(SmolStr::new_static(s))
    }

    /// Returns the key as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for EntryKey {
    #[inline]
    fn from(s: &str) -> Self {
        Self(SmolStr::new(s))
    }
}

impl From<String> for EntryKey {
    #[inline]
    fn from(s: String) -> Self {
        Self(SmolStr::from(s))
    }
}

impl From<SmolStr> for EntryKey {
    #[inline]
    fn from(s: SmolStr) -> Self {
        Self(s)
    }
}

impl AsRef<str> for EntryKey {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for EntryKey {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}
