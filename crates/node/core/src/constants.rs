//! Constants used by the node configuration layer.
//!
//! Pool defaults live next to `PoolConfig` in `tlsp2p-net-peers`.

// =============================================================================
// File System
// =============================================================================

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "tlsp2p.toml";

/// Environment variable overriding the configuration file path.
pub const CONFIG_PATH_ENV: &str = "TLSP2P_CONFIG";

// =============================================================================
// Logging
// =============================================================================

/// Filter used when `--quiet` is set.
pub const QUIET_LOG_FILTER: &str = "error";

/// Environment variable holding extra filter directives.
pub const LOG_FILTER_ENV: &str = "TLSP2P_LOG";
