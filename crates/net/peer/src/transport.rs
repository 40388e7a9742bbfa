//! Seam between the pool and the encrypted wire layer.
//!
//! The wire layer creates handles and accepts inbound streams; everything it
//! reports flows back to the pool as [`TransportInput`] over a single channel,
//! so the pool observes events in the order they were raised.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::candidate::RemoteAddr;
use crate::handle::{PeerEvent, PeerHandle};
use crate::id::PeerId;

/// Identifies one handle instance. A reconnect to the same [`PeerId`] gets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the current id and advances `self`.
    pub fn bump(&mut self) -> Self {
        let current = *self;
        self.0 = self.0.wrapping_add(1);
        current
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a new handle reaches its remote.
#[derive(Debug)]
pub enum Link<S> {
    /// Open a new outbound connection.
    Dial,
    /// Run the secure handshake over an existing raw socket.
    Socket(TcpStream),
    /// Bind to an already established secure stream.
    Stream(S),
}

impl<S> Link<S> {
    pub fn from_parts(socket: Option<TcpStream>, stream: Option<S>) -> Self {
        match (stream, socket) {
            (Some(stream), _) => Self::Stream(stream),
            (None, Some(socket)) => Self::Socket(socket),
            (None, None) => Self::Dial,
        }
    }
}

/// Everything the transport needs to create a handle.
#[derive(Debug)]
pub struct PeerSpec<S> {
    pub id: PeerId,
    /// Protocol network identifier.
    pub magic: u32,
    pub link: Link<S>,
}

/// What the transport reports back to the pool.
#[derive(Debug)]
pub enum TransportInput<S> {
    Peer {
        handle: HandleId,
        id: PeerId,
        event: PeerEvent,
    },
    Inbound {
        remote: SocketAddr,
        stream: S,
    },
}

/// Event sender bound to one handle.
#[derive(Debug)]
pub struct PeerEventSink<S> {
    handle: HandleId,
    id: PeerId,
    tx: mpsc::UnboundedSender<TransportInput<S>>,
}

impl<S> Clone for PeerEventSink<S> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle,
            id: self.id.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<S> PeerEventSink<S> {
    pub fn new(handle: HandleId, id: PeerId, tx: mpsc::UnboundedSender<TransportInput<S>>) -> Self {
        Self { handle, id, tx }
    }

    pub fn handle(&self) -> HandleId {
        self.handle
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.id
    }

    /// Returns `false` once the pool is gone.
    pub fn emit(&self, event: PeerEvent) -> bool {
        self.tx
            .send(TransportInput::Peer {
                handle: self.handle,
                id: self.id.clone(),
                event,
            })
            .is_ok()
    }
}

/// Sender for connections accepted by the listener.
#[derive(Debug)]
pub struct InboundSink<S> {
    tx: mpsc::UnboundedSender<TransportInput<S>>,
}

impl<S> Clone for InboundSink<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S> InboundSink<S> {
    pub fn new(tx: mpsc::UnboundedSender<TransportInput<S>>) -> Self {
        Self { tx }
    }

    /// Returns `false` once the pool is gone.
    pub fn accept(&self, remote: SocketAddr, stream: S) -> bool {
        self.tx
            .send(TransportInput::Inbound { remote, stream })
            .is_ok()
    }
}

/// Listener setup failures.
#[derive(Debug, Error)]
pub enum ListenError {
    #[error("port {port} already in use")]
    AddrInUse { port: u16 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// The encrypted wire layer.
pub trait Transport {
    /// Established secure stream.
    type Stream: RemoteAddr;
    type Peer: PeerHandle;

    /// Creates a handle without starting the handshake; the pool calls
    /// [`PeerHandle::connect`] once the handle is registered.
    fn open(&mut self, spec: PeerSpec<Self::Stream>, events: PeerEventSink<Self::Stream>)
    -> Self::Peer;

    /// Starts accepting inbound secure connections on `port`.
    fn listen(&mut self, port: u16, inbound: InboundSink<Self::Stream>) -> Result<(), ListenError>;

    /// Stops accepting inbound connections. Existing handles are unaffected.
    fn close_listener(&mut self);
}
