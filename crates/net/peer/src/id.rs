//! Peer identity.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between host and port in the serialized identity.
const SEPARATOR: char = '~';

/// Identity of a peer, independent of connection direction.
///
/// Serialized as `host~port`. The same key is used for the live set, the
/// available pool and the bad peer ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId {
    host: String,
    port: u16,
}

impl PeerId {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl From<SocketAddr> for PeerId {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.host, self.port)
    }
}

/// Errors parsing a `host~port` identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerIdError {
    #[error("missing '~' separator in peer id: {0}")]
    MissingSeparator(String),
    #[error("empty host in peer id")]
    EmptyHost,
    #[error("invalid port in peer id: {0}")]
    InvalidPort(String),
}

impl FromStr for PeerId {
    type Err = PeerIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(SEPARATOR)
            .ok_or_else(|| PeerIdError::MissingSeparator(s.to_string()))?;
        if host.is_empty() {
            return Err(PeerIdError::EmptyHost);
        }
        let port = port
            .parse()
            .map_err(|_| PeerIdError::InvalidPort(port.to_string()))?;
        Ok(Self::new(host, port))
    }
}
