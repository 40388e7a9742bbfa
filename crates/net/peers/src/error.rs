use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced to the pool owner.
///
/// Per-peer failures never show up here; they are absorbed by the pool and
/// reported through `error` notifications.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no live peer matched the send filter")]
    NoRecipients,
    #[error("pool service has stopped")]
    ServiceClosed,
    #[error("invalid pool configuration: {0}")]
    Config(#[from] ConfigError),
}
