//! Per-store configuration.
//!
//! One [`StoreConfig`] describes one member of a store chain: which backend to
//! construct and which decorators to put around it. Durations are written in
//! humantime notation (`"10ms"`, `"25s"`).

use std::num::NonZeroUsize;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Configuration of one store in the chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Backend identity, resolved through the [`StoreRegistry`](crate::StoreRegistry).
    pub backend: SmolStr,
    /// Whether this store supplies persistent state to joining nodes.
    #[serde(default)]
    pub fetch_persistent_state: bool,
    /// Whether cache writes must never reach this store.
    #[serde(default)]
    pub ignore_modifications: bool,
    /// Whether one logical instance of this store is shared by the whole cluster.
    #[serde(default)]
    pub shared: bool,
    /// Whether the store is cleared when the chain starts.
    #[serde(default)]
    pub purge_on_startup: bool,
    /// Write-behind settings.
    #[serde(default)]
    pub async_store: AsyncStoreConfig,
    /// Cluster-singleton settings.
    #[serde(default)]
    pub singleton_store: SingletonStoreConfig,
    /// Backend-specific properties, passed to the store factory untouched.
    #[serde(default)]
    pub properties: IndexMap<String, String>,
}

impl StoreConfig {
    /// Creates a plain configuration for `backend` with every option off.
    pub fn new(backend: impl Into<SmolStr>) -> Self {
        Self {
            backend: backend.into(),
            fetch_persistent_state: false,
            ignore_modifications: false,
            shared: false,
            purge_on_startup: false,
            async_store: AsyncStoreConfig::default(),
            singleton_store: SingletonStoreConfig::default(),
            properties: IndexMap::new(),
        }
    }

    /// Marks the store as the state-transfer source.
    pub fn fetch_persistent_state(self, enabled: bool) -> Self {
        Self {
            fetch_persistent_state: enabled,
            ..self
        }
    }

    /// Makes the store read-only from the cache's point of view.
    pub fn ignore_modifications(self, enabled: bool) -> Self {
        Self {
            ignore_modifications: enabled,
            ..self
        }
    }

    /// Marks the store as shared across the cluster.
    pub fn shared(self, enabled: bool) -> Self {
        Self {
            shared: enabled,
            ..self
        }
    }

    /// Clears the store when the chain starts.
    pub fn purge_on_startup(self, enabled: bool) -> Self {
        Self {
            purge_on_startup: enabled,
            ..self
        }
    }

    /// Sets write-behind settings.
    pub fn async_store(self, async_store: AsyncStoreConfig) -> Self {
        Self {
            async_store,
            ..self
        }
    }

    /// Sets cluster-singleton settings.
    pub fn singleton_store(self, singleton_store: SingletonStoreConfig) -> Self {
        Self {
            singleton_store,
            ..self
        }
    }

    /// Adds a backend-specific property.
    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// Write-behind settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AsyncStoreConfig {
    /// Whether writes are queued and applied in the background.
    #[serde(default)]
    pub enabled: bool,
    /// Maximum number of pending modifications.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: NonZeroUsize,
    /// How long the drain worker waits for a batch to accumulate.
    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,
    /// Retries of a failed modification before it is dropped.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// How long `stop` waits for the queue to drain.
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// How long a producer blocks on a full queue before failing.
    ///
    /// `None` blocks until space frees up.
    #[serde(default, with = "humantime_serde")]
    pub offer_timeout: Option<Duration>,
}

fn default_queue_capacity() -> NonZeroUsize {
    NonZeroUsize::new(1024).unwrap_or(NonZeroUsize::MIN)
}

fn default_flush_interval() -> Duration {
    Duration::from_millis(10)
}

fn default_max_retries() -> u32 {
    3
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(25)
}

impl Default for AsyncStoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            queue_capacity: default_queue_capacity(),
            flush_interval: default_flush_interval(),
            max_retries: default_max_retries(),
            shutdown_timeout: default_shutdown_timeout(),
            offer_timeout: None,
        }
    }
}

impl AsyncStoreConfig {
    /// Enabled write-behind with default settings.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Set queue capacity.
    pub fn queue_capacity(self, capacity: NonZeroUsize) -> Self {
        Self {
            queue_capacity: capacity,
            ..self
        }
    }

    /// Set flush interval.
    pub fn flush_interval(self, interval: Duration) -> Self {
        Self {
            flush_interval: interval,
            ..self
        }
    }

    /// Set max retries.
    pub fn max_retries(self, retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..self
        }
    }

    /// Set shutdown timeout.
    pub fn shutdown_timeout(self, timeout: Duration) -> Self {
        Self {
            shutdown_timeout: timeout,
            ..self
        }
    }

    /// Set offer timeout.
    pub fn offer_timeout(self, timeout: Duration) -> Self {
        Self {
            offer_timeout: Some(timeout),
            ..self
        }
    }
}

/// Cluster-singleton settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SingletonStoreConfig {
    /// Whether only the coordinator writes to this store.
    #[serde(default)]
    pub enabled: bool,
    /// Whether the new coordinator replays the cache contents into the store.
    #[serde(default = "default_push_state")]
    pub push_state_when_coordinator: bool,
    /// Upper bound for the state push.
    #[serde(default = "default_push_state_timeout", with = "humantime_serde")]
    pub push_state_timeout: Duration,
}

fn default_push_state() -> bool {
    true
}

fn default_push_state_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for SingletonStoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            push_state_when_coordinator: default_push_state(),
            push_state_timeout: default_push_state_timeout(),
        }
    }
}

impl SingletonStoreConfig {
    /// Enabled singleton mode with default settings.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Enable or disable the state push on coordinator election.
    pub fn push_state_when_coordinator(self, enabled: bool) -> Self {
        Self {
            push_state_when_coordinator: enabled,
            ..self
        }
    }

    /// Set push state timeout.
    pub fn push_state_timeout(self, timeout: Duration) -> Self {
        Self {
            push_state_timeout: timeout,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config: StoreConfig = serde_saphyr::from_str("backend: file\n").unwrap();
        assert_eq!(config, StoreConfig::new("file"));
        assert_eq!(config.async_store.queue_capacity.get(), 1024);
        assert!(config.singleton_store.push_state_when_coordinator);
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
backend: jdbc
fetch_persistent_state: true
shared: true
properties:
  table: entries
async_store:
  enabled: true
  queue_capacity: 16
  flush_interval: 5ms
  max_retries: 1
  shutdown_timeout: 2s
  offer_timeout: 100ms
"#;
        let config: StoreConfig = serde_saphyr::from_str(yaml).unwrap();
        assert!(config.fetch_persistent_state);
        assert!(config.shared);
        assert_eq!(config.properties.get("table").map(String::as_str), Some("entries"));
        assert_eq!(
            config.async_store,
            AsyncStoreConfig::enabled()
                .queue_capacity(NonZeroUsize::new(16).unwrap())
                .flush_interval(Duration::from_millis(5))
                .max_retries(1)
                .shutdown_timeout(Duration::from_secs(2))
                .offer_timeout(Duration::from_millis(100))
        );
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let yaml = "backend: file\nasync_store:\n  queue_capacity: 0\n";
        assert!(serde_saphyr::from_str::<StoreConfig>(yaml).is_err());
    }
}
