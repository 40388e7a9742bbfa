//! Peer pool CLI arguments.

use clap::Args;
use tlsp2p_net_peers::PoolConfig;

/// Overrides for the `[pool]` configuration table.
#[derive(Debug, Args, Clone, Default, PartialEq, Eq)]
#[command(next_help_heading = "Peer pool")]
pub struct PoolArgs {
    /// Accept inbound connections.
    #[arg(long = "pool.listen")]
    pub listen: bool,

    /// Listening port, also the default port for candidates without one.
    #[arg(long = "pool.port", value_name = "PORT")]
    pub port: Option<u16>,

    /// Network magic passed to every peer handle.
    #[arg(long = "pool.magic", value_name = "MAGIC", value_parser = parse_magic)]
    pub magic: Option<u32>,

    /// Live peer floor maintained by the health monitor.
    #[arg(long = "pool.min-peers", value_name = "COUNT")]
    pub min_peers: Option<usize>,

    /// Connections to front-load while initiating.
    #[arg(long = "pool.target-peers", value_name = "COUNT")]
    pub target_peers: Option<usize>,

    /// Live peer ceiling checked by the health monitor.
    #[arg(long = "pool.max-peers", value_name = "COUNT")]
    pub max_peers: Option<usize>,

    /// Silence after which a peer is disconnected.
    #[arg(long = "pool.idle-timeout", value_name = "MS")]
    pub idle_timeout_ms: Option<u64>,

    /// Handshake deadline and graceful close window.
    #[arg(long = "pool.connect-timeout", value_name = "MS")]
    pub connect_timeout_ms: Option<u64>,

    /// Health monitor period.
    #[arg(long = "pool.check-interval", value_name = "MS")]
    pub check_interval_ms: Option<u64>,

    /// Status notification period.
    #[arg(long = "pool.status-interval", value_name = "MS")]
    pub status_interval_ms: Option<u64>,

    /// Penalty added for each peer error.
    #[arg(long = "pool.error-penalty", value_name = "MINUTES")]
    pub error_penalty_mins: Option<u64>,
}

impl PoolArgs {
    /// Writes every flag that was given into `config`.
    pub fn apply_to(&self, config: &mut PoolConfig) {
        if self.listen {
            config.listen = true;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(magic) = self.magic {
            config.magic = magic;
        }
        if let Some(min_peers) = self.min_peers {
            config.min_peers = min_peers;
        }
        if let Some(target_peers) = self.target_peers {
            config.target_peers = Some(target_peers);
        }
        if let Some(max_peers) = self.max_peers {
            config.max_peers = max_peers;
        }
        if let Some(ms) = self.idle_timeout_ms {
            config.idle_timeout_ms = ms;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout_ms = ms;
        }
        if let Some(ms) = self.check_interval_ms {
            config.check_interval_ms = ms;
        }
        if let Some(ms) = self.status_interval_ms {
            config.status_interval_ms = ms;
        }
        if let Some(mins) = self.error_penalty_mins {
            config.error_penalty_mins = mins;
        }
    }
}

/// Accepts decimal or `0x`-prefixed hex.
fn parse_magic(value: &str) -> Result<u32, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|err| format!("invalid magic '{value}': {err}"))
}
