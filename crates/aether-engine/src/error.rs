use std::time::Duration;

use aether_core::config::ConfigError;
use aether_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid run config: {0}")]
    Config(#[from] ConfigError),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("run timeout after {0:?}")]
    RunTimeout(Duration),

    #[error("{0}")]
    Internal(String),
}
