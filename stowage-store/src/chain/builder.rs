//! Builds a [`ChainingStore`] from configuration.

use std::sync::Arc;

use stowage_core::Offload;

use crate::Store;
use crate::chain::{ChainMember, ChainingStore};
use crate::config::StoreConfig;
use crate::decorator::{ReadOnlyStore, SingletonStore, WriteBehindStore};
use crate::error::ConfigurationError;
use crate::registry::StoreRegistry;

/// Builder for a [`ChainingStore`].
///
/// The whole configuration is validated before the first store is
/// constructed, so an invalid chain never starts a store.
///
/// # Example
///
/// ```ignore
/// use stowage_store::{ChainBuilder, StoreConfig};
///
/// let chain = ChainBuilder::new(registry, offload)
///     .store(StoreConfig::new("jdbc").fetch_persistent_state(true))
///     .store(StoreConfig::new("file").ignore_modifications(true))
///     .build()?;
/// ```
pub struct ChainBuilder<O>
where
    O: Offload,
{
    registry: StoreRegistry,
    offload: O,
    configs: Vec<StoreConfig>,
}

impl<O> ChainBuilder<O>
where
    O: Offload,
{
    pub fn new(registry: StoreRegistry, offload: O) -> Self {
        Self {
            registry,
            offload,
            configs: Vec::new(),
        }
    }

    /// Appends a store to the chain.
    pub fn store(mut self, config: StoreConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Appends several stores to the chain, in order.
    pub fn stores(mut self, configs: impl IntoIterator<Item = StoreConfig>) -> Self {
        self.configs.extend(configs);
        self
    }

    /// Checks the chain invariants without constructing anything.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut source: Option<&StoreConfig> = None;
        for config in &self.configs {
            if config.fetch_persistent_state {
                if let Some(first) = source {
                    return Err(ConfigurationError::MultipleStateTransferSources {
                        first: first.backend.clone(),
                        second: config.backend.clone(),
                    });
                }
                source = Some(config);
            }
            if config.singleton_store.enabled && config.shared {
                return Err(ConfigurationError::SingletonShared {
                    backend: config.backend.clone(),
                });
            }
            if !self.registry.contains(&config.backend) {
                return Err(ConfigurationError::UnknownBackend(config.backend.clone()));
            }
        }
        Ok(())
    }

    /// Validates the configuration, then constructs and decorates every store.
    pub fn build(self) -> Result<ChainingStore, ConfigurationError> {
        self.validate()?;

        let mut members = Vec::with_capacity(self.configs.len());
        for config in self.configs {
            let factory = self
                .registry
                .factory(&config.backend)
                .ok_or_else(|| ConfigurationError::UnknownBackend(config.backend.clone()))?;
            let base = factory(&config).map_err(|source| ConfigurationError::StoreCreation {
                backend: config.backend.clone(),
                source,
            })?;
            members.push(decorate(base, config, &self.offload));
        }

        tracing::debug!(stores = members.len(), "built store chain");
        Ok(ChainingStore::new(members))
    }
}

fn decorate<O>(base: Arc<dyn Store>, config: StoreConfig, offload: &O) -> ChainMember
where
    O: Offload,
{
    let mut store = base;
    if config.async_store.enabled {
        store = Arc::new(WriteBehindStore::new(
            store,
            offload.clone(),
            config.async_store.clone(),
        ));
    }
    if config.ignore_modifications {
        store = Arc::new(ReadOnlyStore::new(store));
    }
    let singleton = config
        .singleton_store
        .enabled
        .then(|| SingletonStore::new(store.clone(), config.singleton_store.clone()));
    if let Some(singleton) = &singleton {
        store = Arc::new(singleton.clone());
    }

    tracing::trace!(backend = %config.backend, store = %store.label(), "decorated store");
    ChainMember::new(store, config, singleton)
}
