//! Store label type for identifying stores in logs and metrics.
//!
//! `StoreLabel` is a newtype wrapper around `SmolStr`. Decorators compose their
//! own label with the label of the store they wrap, so a write-behind store
//! around a JDBC store logs as `write-behind.jdbc`.

use smol_str::SmolStr;
use std::fmt;

/// A label identifying a store or a decorated store.
///
/// # Example
/// ```
/// use stowage_core::StoreLabel;
///
/// let label = StoreLabel::new("read-only");
/// let composed = label.compose(&StoreLabel::new("jdbc"));
/// assert_eq!(composed.as_str(), "read-only.jdbc");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StoreLabel(SmolStr);

impl StoreLabel {
    /// Creates a new store label.
    #[inline]
    pub fn new(s: impl Into<SmolStr>) -> Self {
        Self(s.into())
    }

    /// Creates a store label from a static string (no allocation).
    #[inline]
    pub const fn new_static(s: &'static str) -> Self {
        Self(SmolStr::new_static(s))
    }

    /// Returns the label as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Composes two labels with a dot separator: "self.other".
    #[inline]
    pub fn compose(&self, other: &StoreLabel) -> Self {
        Self(SmolStr::from(format!("{}.{}", self.0, other.0)))
    }
}

impl fmt::Display for StoreLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for StoreLabel {
    #[inline]
    fn from(s: &str) -> Self {
        Self(SmolStr::new(s))
    }
}

impl From<SmolStr> for StoreLabel {
    #[inline]
    fn from(s: SmolStr) -> Self {
        Self(s)
    }
}
