//! Pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default listening and dialing port.
pub const DEFAULT_PORT: u16 = 8333;

/// Default protocol network identifier.
pub const DEFAULT_MAGIC: u32 = 0xD9B4_BEF9;

pub const DEFAULT_MIN_PEERS: usize = 3;
pub const DEFAULT_TARGET_PEERS: usize = 10;
pub const DEFAULT_MAX_PEERS: usize = 20;

/// Peers silent for longer than this are disconnected (30 minutes).
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 30 * 60 * 1000;

/// Connect attempt window, also used as the graceful-close window.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_STATUS_INTERVAL_MS: u64 = 60_000;

/// Penalty recorded for a failed or erroring peer.
pub const DEFAULT_ERROR_PENALTY_MINS: u64 = 10;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("min_peers ({min}) exceeds max_peers ({max})")]
    MinAboveMax { min: usize, max: usize },
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

/// Immutable pool options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Accept inbound connections.
    pub listen: bool,
    pub port: u16,
    pub magic: u32,
    pub min_peers: usize,
    /// Front-loaded connection count while initiating. `None` uses the min/max midpoint.
    pub target_peers: Option<usize>,
    pub max_peers: usize,
    pub idle_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub check_interval_ms: u64,
    pub status_interval_ms: u64,
    pub error_penalty_mins: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            listen: false,
            port: DEFAULT_PORT,
            magic: DEFAULT_MAGIC,
            min_peers: DEFAULT_MIN_PEERS,
            target_peers: Some(DEFAULT_TARGET_PEERS),
            max_peers: DEFAULT_MAX_PEERS,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
            status_interval_ms: DEFAULT_STATUS_INTERVAL_MS,
            error_penalty_mins: DEFAULT_ERROR_PENALTY_MINS,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_peers > self.max_peers {
            return Err(ConfigError::MinAboveMax {
                min: self.min_peers,
                max: self.max_peers,
            });
        }
        for (name, value) in [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("check_interval_ms", self.check_interval_ms),
            ("status_interval_ms", self.status_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroInterval(name));
            }
        }
        Ok(())
    }

    /// Live count to reach while initiating.
    pub fn initial_target(&self) -> usize {
        self.target_peers
            .unwrap_or((self.min_peers + self.max_peers) / 2)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn error_penalty(&self) -> Duration {
        Duration::from_secs(self.error_penalty_mins.saturating_mul(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert!(!config.listen);
        assert_eq!(config.port, 8333);
        assert_eq!(config.magic, 0xD9B4BEF9);
        assert_eq!(config.idle_timeout(), Duration::from_secs(30 * 60));
        assert_eq!(config.error_penalty(), Duration::from_secs(600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_error_penalty_saturates() {
        let config = PoolConfig {
            error_penalty_mins: u64::MAX / 10,
            ..Default::default()
        };
        assert_eq!(config.error_penalty(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_initial_target_falls_back_to_midpoint() {
        let config = PoolConfig {
            min_peers: 4,
            max_peers: 12,
            target_peers: None,
            ..Default::default()
        };
        assert_eq!(config.initial_target(), 8);

        let config = PoolConfig {
            target_peers: Some(5),
            ..config
        };
        assert_eq!(config.initial_target(), 5);
    }

    #[test]
    fn test_validate_rejects_inverted_band() {
        let config = PoolConfig {
            min_peers: 9,
            max_peers: 2,
            ..Default::default()
        };
        assert_matches!(
            config.validate(),
            Err(ConfigError::MinAboveMax { min: 9, max: 2 })
        );
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = PoolConfig {
            check_interval_ms: 0,
            ..Default::default()
        };
        assert_matches!(
            config.validate(),
            Err(ConfigError::ZeroInterval("check_interval_ms"))
        );
    }
}
