//! Loader configuration.
//!
//! A [`LoadersConfig`] is what the cache hands the loader manager: whether to
//! preload, whether the cache passivates, how often to purge expired entries
//! and the ordered list of stores. It is usually read from YAML:
//!
//! ```yaml
//! preload: true
//! purge_interval: 60s
//! stores:
//!   - backend: jdbc
//!     fetch_persistent_state: true
//!     async_store:
//!       enabled: true
//!       queue_capacity: 1024
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stowage_store::StoreConfig;

use crate::error::ConfigError;

/// Configuration of the loader manager and its store chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadersConfig {
    /// Load the cache from the chain's bulk-capable store on startup.
    #[serde(default)]
    pub preload: bool,
    /// The cache writes entries to the stores only when evicting them.
    #[serde(default)]
    pub passivation: bool,
    /// Interval of the background purge of expired entries (e.g. "60s").
    #[serde(default, with = "humantime_serde")]
    pub purge_interval: Option<Duration>,
    /// Stores in chain order.
    #[serde(default)]
    pub stores: Vec<StoreConfig>,
}

impl LoadersConfig {
    /// Parses a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_saphyr::from_str(yaml)?)
    }

    /// Create a new builder.
    pub fn builder() -> LoadersConfigBuilder {
        LoadersConfigBuilder::default()
    }
}

/// Builder for [`LoadersConfig`].
#[derive(Debug, Clone, Default)]
pub struct LoadersConfigBuilder {
    config: LoadersConfig,
}

impl LoadersConfigBuilder {
    /// Enable or disable preload.
    pub fn preload(mut self, enabled: bool) -> Self {
        self.config.preload = enabled;
        self
    }

    /// Enable or disable passivation.
    pub fn passivation(mut self, enabled: bool) -> Self {
        self.config.passivation = enabled;
        self
    }

    /// Set the background purge interval.
    pub fn purge_interval(mut self, interval: Duration) -> Self {
        self.config.purge_interval = Some(interval);
        self
    }

    /// Append a store to the chain.
    pub fn store(mut self, store: StoreConfig) -> Self {
        self.config.stores.push(store);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> LoadersConfig {
        self.config
    }
}
