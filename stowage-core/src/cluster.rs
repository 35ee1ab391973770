//! Coordinator-election messages.

use std::fmt;

/// A change of this node's coordinator role, as delivered by cluster membership.
///
/// Exactly one event is delivered per change, in happens-before order relative
/// to membership changes. Singleton stores react to these; they never decide
/// coordinator status themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinatorEvent {
    /// This node became the cluster coordinator.
    BecameCoordinator,
    /// This node stopped being the cluster coordinator.
    LostCoordinator,
}

impl CoordinatorEvent {
    /// Whether this node is coordinator after the event.
    pub const fn is_coordinator(&self) -> bool {
        matches!(self, Self::BecameCoordinator)
    }
}

impl fmt::Display for CoordinatorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BecameCoordinator => f.write_str("became-coordinator"),
            Self::LostCoordinator => f.write_str("lost-coordinator"),
        }
    }
}
