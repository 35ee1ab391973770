use stowage_store::{ConfigurationError, StoreError};
use thiserror::Error;

/// Error type of the loader manager.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The store chain configuration is invalid. Always aborts startup.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Initializing or starting the store chain failed.
    #[error("failed to start store chain")]
    Start(#[source] StoreError),

    /// A store operation requested through the manager failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Preloading the cache failed.
    #[error("preload failed")]
    Preload(#[source] StoreError),
}

/// Error raised while reading loader configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The YAML document could not be parsed into a configuration.
    #[error("invalid loader configuration: {0}")]
    Parse(#[from] serde_saphyr::Error),
}
