//! In-memory transport for pool tests.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tlsp2p_net_peer::{
    InboundSink, Link, ListenError, PeerConnState, PeerEvent, PeerEventSink,
    PeerHandle, PeerId, PeerSpec, RemoteAddr, Transport,
};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::{DEFAULT_PORT, PoolConfig};
use crate::events::PoolEvent;
use crate::manager::PeerPool;

pub(crate) fn peer_id(host: &str) -> PeerId {
    PeerId::new(host, DEFAULT_PORT)
}

/// Everything currently buffered on `rx`.
pub(crate) fn drain(rx: &mut broadcast::Receiver<PoolEvent>) -> Vec<PoolEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Messages of the `error` notifications in `events`.
pub(crate) fn error_messages(events: &[PoolEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            PoolEvent::Error { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MockCall {
    Connect,
    Disconnect,
    Destroy,
    Send(String, Bytes),
}

#[derive(Debug)]
pub(crate) struct MockStream {
    remote: SocketAddr,
}

impl MockStream {
    pub(crate) fn new(remote: &str) -> Self {
        Self {
            remote: remote.parse().unwrap(),
        }
    }
}

impl RemoteAddr for MockStream {
    fn remote_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.remote)
    }
}

#[derive(Debug)]
struct PeerRecord {
    inbound: bool,
    state: PeerConnState,
    last_seen: Option<Instant>,
    calls: Vec<MockCall>,
    events: PeerEventSink<MockStream>,
    closed: bool,
}

#[derive(Debug, Default)]
struct MockNet {
    /// Every handle opened per identity, oldest first.
    peers: HashMap<PeerId, Vec<Arc<Mutex<PeerRecord>>>>,
    port_taken: bool,
    listening_on: Option<u16>,
    listener_closed: bool,
    inbound: Option<InboundSink<MockStream>>,
}

/// Transport double. Clones share state, so a test keeps one clone while the
/// pool owns another.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockTransport {
    net: Arc<Mutex<MockNet>>,
}

impl MockTransport {
    pub(crate) fn pool(&self, config: PoolConfig) -> PeerPool<MockTransport> {
        PeerPool::new(config, self.clone()).unwrap()
    }

    fn record(&self, id: &PeerId, index: Option<usize>) -> Arc<Mutex<PeerRecord>> {
        let net = self.net.lock();
        let handles = net.peers.get(id).unwrap();
        let record = match index {
            Some(index) => handles.get(index),
            None => handles.last(),
        };
        Arc::clone(record.unwrap())
    }

    /// Completes the handshake of the newest handle for `id`.
    pub(crate) fn connect(&self, id: &PeerId) {
        let record = self.record(id, None);
        let mut record = record.lock();
        record.state = PeerConnState::Connected;
        record.events.emit(PeerEvent::Connect);
    }

    /// Raises `event` on the newest handle for `id`.
    pub(crate) fn emit(&self, id: &PeerId, event: PeerEvent) {
        self.record(id, None).lock().events.emit(event);
    }

    /// Raises `event` on the `index`-th handle ever opened for `id`.
    pub(crate) fn emit_from(&self, id: &PeerId, index: usize, event: PeerEvent) {
        self.record(id, Some(index)).lock().events.emit(event);
    }

    pub(crate) fn set_last_seen(&self, id: &PeerId, at: Option<Instant>) {
        self.record(id, None).lock().last_seen = at;
    }

    pub(crate) fn calls(&self, id: &PeerId) -> Vec<MockCall> {
        self.record(id, None).lock().calls.clone()
    }

    pub(crate) fn handles_opened(&self, id: &PeerId) -> usize {
        self.net.lock().peers.get(id).map_or(0, Vec::len)
    }

    pub(crate) fn occupy_port(&self) {
        self.net.lock().port_taken = true;
    }

    pub(crate) fn listening_on(&self) -> Option<u16> {
        self.net.lock().listening_on
    }

    pub(crate) fn listener_closed(&self) -> bool {
        self.net.lock().listener_closed
    }

    pub(crate) fn inbound_sink(&self) -> InboundSink<MockStream> {
        self.net.lock().inbound.clone().unwrap()
    }

    /// Delivers an inbound connection from `remote` through the listener.
    pub(crate) fn accept(&self, remote: &str) -> bool {
        let sink = self.inbound_sink();
        sink.accept(remote.parse().unwrap(), MockStream::new(remote))
    }
}

impl Transport for MockTransport {
    type Stream = MockStream;
    type Peer = MockPeer;

    fn open(&mut self, spec: PeerSpec<MockStream>, events: PeerEventSink<MockStream>) -> MockPeer {
        let record = Arc::new(Mutex::new(PeerRecord {
            inbound: matches!(spec.link, Link::Stream(_)),
            state: PeerConnState::New,
            last_seen: None,
            calls: Vec::new(),
            events,
            closed: false,
        }));
        self.net
            .lock()
            .peers
            .entry(spec.id.clone())
            .or_default()
            .push(Arc::clone(&record));
        MockPeer {
            id: spec.id,
            record,
        }
    }

    fn listen(&mut self, port: u16, inbound: InboundSink<MockStream>) -> Result<(), ListenError> {
        let mut net = self.net.lock();
        if net.port_taken {
            return Err(ListenError::AddrInUse { port });
        }
        net.listening_on = Some(port);
        net.inbound = Some(inbound);
        Ok(())
    }

    fn close_listener(&mut self) {
        let mut net = self.net.lock();
        net.listening_on = None;
        net.listener_closed = true;
        net.inbound = None;
    }
}

#[derive(Debug)]
pub(crate) struct MockPeer {
    id: PeerId,
    record: Arc<Mutex<PeerRecord>>,
}

impl PeerHandle for MockPeer {
    fn id(&self) -> &PeerId {
        &self.id
    }

    fn state(&self) -> PeerConnState {
        self.record.lock().state
    }

    fn set_state(&mut self, state: PeerConnState) {
        self.record.lock().state = state;
    }

    fn last_seen(&self) -> Option<Instant> {
        self.record.lock().last_seen
    }

    fn connect(&mut self) {
        let mut record = self.record.lock();
        record.calls.push(MockCall::Connect);
        record.state = if record.inbound {
            PeerConnState::Connected
        } else {
            PeerConnState::Connecting
        };
    }

    fn disconnect(&mut self) {
        self.record.lock().calls.push(MockCall::Disconnect);
    }

    fn destroy(&mut self) {
        let mut record = self.record.lock();
        record.calls.push(MockCall::Destroy);
        record.state = PeerConnState::Closed;
        if !record.closed {
            record.closed = true;
            record.events.emit(PeerEvent::Close);
        }
    }

    fn send(&mut self, command: &str, payload: Bytes) {
        self.record
            .lock()
            .calls
            .push(MockCall::Send(command.to_string(), payload));
    }
}
