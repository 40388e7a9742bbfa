//! Inbound connection admission.

use std::net::SocketAddr;

use tlsp2p_net_peer::{InboundSink, Link, ListenError, PeerHandle, PeerId, Transport};
use tracing::debug;

use crate::events::{PoolEvent, Severity};
use crate::live::LiveEntry;
use crate::manager::PeerPool;

impl<T: Transport> PeerPool<T> {
    /// Asks the transport to accept connections on the configured port.
    ///
    /// A bind failure is reported and the pool keeps running without a listener.
    pub(crate) fn open_listener(&mut self) {
        let port = self.config.port;
        self.events
            .report(Severity::Info, "Opening listening port...");

        match self
            .transport
            .listen(port, InboundSink::new(self.input_tx.clone()))
        {
            Ok(()) => {
                self.listening = true;
                self.events.report(
                    Severity::Info,
                    format!("Now accepting connections on port {port}"),
                );
            }
            Err(ListenError::AddrInUse { .. }) => self.events.report(
                Severity::Warning,
                format!("Can't open listening on port {port}; port already in use"),
            ),
            Err(error) => self.events.report(
                Severity::Warning,
                format!("Can't open listening on port {port}; {error}"),
            ),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Wraps an accepted stream as a handle and admits it.
    ///
    /// Refused while shutting down, when the identity is already live, or while
    /// it carries a penalty. A refused stream is dropped.
    pub(crate) fn accept_inbound(&mut self, remote: SocketAddr, stream: T::Stream) {
        let id = PeerId::from(remote);
        if self.state.is_shutdown() {
            debug!(%id, "inbound connection refused during shutdown");
            return;
        }
        if self.live.contains(&id) {
            self.events.report(
                Severity::Warning,
                format!("Already connected to peer {id} yet they contacted us?"),
            );
            return;
        }
        if self.ledger.is_penalized(&id) {
            debug!(%id, "inbound connection refused; penalty active");
            return;
        }

        self.available.remove(&id);
        let (handle, mut peer) = self.open_handle(&id, Link::Stream(stream));
        peer.connect();
        if let Err(mut rejected) = self.live.insert(id.clone(), LiveEntry::new(handle, peer, true)) {
            rejected.peer.destroy();
            return;
        }
        debug!(%id, %handle, live = self.live.len(), "inbound peer admitted");

        self.mark_connected();
        self.events.emit(PoolEvent::ListenConnect { peer: id });
    }
}
