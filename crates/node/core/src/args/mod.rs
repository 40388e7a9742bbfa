//! CLI argument structs for node configuration.
//!
//! [`LogArgs`] doubles as the persisted `[log]` table. [`PoolArgs`] only carries
//! overrides; anything left unset keeps the value from the configuration file.

mod log;
mod pool;

pub use log::LogArgs;
pub use pool::PoolArgs;
