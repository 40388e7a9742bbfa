//! Candidate peer addresses.
//!
//! A candidate arrives in one of five shapes and is normalized into a single
//! [`Target`] before it may enter the pool.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpStream;

use crate::id::PeerId;

/// Separators accepted between entries of a batch string.
const BATCH_SEPARATORS: [char; 2] = ['|', '\n'];

/// A connection-carrying value that can report the address of the far end.
pub trait RemoteAddr {
    fn remote_addr(&self) -> io::Result<SocketAddr>;
}

impl RemoteAddr for TcpStream {
    fn remote_addr(&self) -> io::Result<SocketAddr> {
        self.peer_addr()
    }
}

/// One candidate address, in any of the accepted forms.
///
/// `S` is the transport's established secure stream type.
#[derive(Debug)]
pub enum Candidate<S> {
    /// `"host[:port][/suffix]"`.
    Text(String),
    /// `(host, port)`; a missing port falls back to the configured default.
    Pair(String, Option<u16>),
    /// Explicit host and port, optionally carrying an underlying connection.
    Address {
        host: String,
        port: Option<u16>,
        socket: Option<TcpStream>,
        stream: Option<S>,
    },
    /// Raw transport socket; identity comes from its remote address.
    Socket(TcpStream),
    /// Already established secure stream; identity comes from its remote address.
    Stream(S),
}

/// Normalized candidate.
#[derive(Debug)]
pub struct Target<S> {
    pub id: PeerId,
    pub socket: Option<TcpStream>,
    pub stream: Option<S>,
}

impl<S> Target<S> {
    pub fn dial(id: PeerId) -> Self {
        Self {
            id,
            socket: None,
            stream: None,
        }
    }
}

/// Reasons a candidate is rejected during normalization.
#[derive(Debug, Error)]
pub enum CandidateError {
    #[error("candidate has an empty host")]
    EmptyHost,
    #[error("candidate has an invalid port: {0}")]
    InvalidPort(String),
    #[error("cannot read remote address of connection: {0}")]
    NoRemoteAddr(#[from] io::Error),
}

impl<S> Candidate<S> {
    /// Splits a batch string on `|` and newlines, skipping blank entries.
    pub fn parse_batch(input: &str) -> Vec<Self> {
        input
            .split(BATCH_SEPARATORS)
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| Self::Text(entry.to_string()))
            .collect()
    }
}

impl<S: RemoteAddr> Candidate<S> {
    /// Normalizes the candidate, filling a missing port with `default_port`.
    pub fn normalize(self, default_port: u16) -> Result<Target<S>, CandidateError> {
        match self {
            Self::Text(text) => {
                let id = parse_text(&text, default_port)?;
                Ok(Target::dial(id))
            }
            Self::Pair(host, port) => {
                let id = peer_id(&host, port.unwrap_or(default_port))?;
                Ok(Target::dial(id))
            }
            Self::Address {
                host,
                port,
                socket,
                stream,
            } => Ok(Target {
                id: peer_id(&host, port.unwrap_or(default_port))?,
                socket,
                stream,
            }),
            Self::Socket(socket) => Ok(Target {
                id: PeerId::from(socket.peer_addr()?),
                socket: Some(socket),
                stream: None,
            }),
            Self::Stream(stream) => Ok(Target {
                id: PeerId::from(stream.remote_addr()?),
                socket: None,
                stream: Some(stream),
            }),
        }
    }
}

fn parse_text(text: &str, default_port: u16) -> Result<PeerId, CandidateError> {
    let mut parts = text.split(':');
    let host = parts.next().unwrap_or_default();
    let port = match parts.next() {
        Some(rest) => {
            let port = rest.split('/').next().unwrap_or_default().trim();
            port.parse()
                .map_err(|_| CandidateError::InvalidPort(port.to_string()))?
        }
        None => default_port,
    };
    peer_id(host, port)
}

fn peer_id(host: &str, port: u16) -> Result<PeerId, CandidateError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(CandidateError::EmptyHost);
    }
    Ok(PeerId::new(host, port))
}

impl<S> From<&str> for Candidate<S> {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl<S> From<String> for Candidate<S> {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl<S> From<(String, u16)> for Candidate<S> {
    fn from((host, port): (String, u16)) -> Self {
        Self::Pair(host, Some(port))
    }
}

impl<S> From<(&str, u16)> for Candidate<S> {
    fn from((host, port): (&str, u16)) -> Self {
        Self::Pair(host.to_string(), Some(port))
    }
}

impl<S> From<SocketAddr> for Candidate<S> {
    fn from(addr: SocketAddr) -> Self {
        Self::Pair(addr.ip().to_string(), Some(addr.port()))
    }
}

impl<S> From<PeerId> for Candidate<S> {
    fn from(id: PeerId) -> Self {
        Self::Pair(id.host().to_string(), Some(id.port()))
    }
}

impl<S> From<TcpStream> for Candidate<S> {
    fn from(socket: TcpStream) -> Self {
        Self::Socket(socket)
    }
}
