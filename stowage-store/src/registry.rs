//! Backend registry.
//!
//! Configuration names backends by string. The registry maps each name to a
//! factory that builds the undecorated store from its [`StoreConfig`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use smol_str::SmolStr;
use stowage_core::BoxError;

use crate::Store;
use crate::config::StoreConfig;

/// Builds an undecorated store from its configuration entry.
pub type StoreFactory =
    Arc<dyn Fn(&StoreConfig) -> Result<Arc<dyn Store>, BoxError> + Send + Sync>;

/// Maps backend names to store factories.
///
/// # Example
/// ```ignore
/// use stowage_store::StoreRegistry;
///
/// let registry = StoreRegistry::new()
///     .register("jdbc", |config| Ok(Arc::new(JdbcStore::connect(&config.properties)?) as _));
/// ```
#[derive(Clone, Default)]
pub struct StoreRegistry {
    factories: HashMap<SmolStr, StoreFactory>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` for `backend`, replacing any previous one.
    pub fn register<F>(mut self, backend: impl Into<SmolStr>, factory: F) -> Self
    where
        F: Fn(&StoreConfig) -> Result<Arc<dyn Store>, BoxError> + Send + Sync + 'static,
    {
        self.factories.insert(backend.into(), Arc::new(factory));
        self
    }

    /// Whether a factory is registered for `backend`.
    pub fn contains(&self, backend: &str) -> bool {
        self.factories.contains_key(backend)
    }

    /// Returns the factory for `backend`.
    pub fn factory(&self, backend: &str) -> Option<&StoreFactory> {
        self.factories.get(backend)
    }
}

impl fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut backends: Vec<&str> = self.factories.keys().map(SmolStr::as_str).collect();
        backends.sort_unstable();
        f.debug_struct("StoreRegistry")
            .field("backends", &backends)
            .finish()
    }
}
