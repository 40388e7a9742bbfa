//! Lifecycle manager: single owner of the live set, available pool and bad peer ledger.
//!
//! All mutation happens on the caller's thread. Work that must not run inline
//! (starting a handshake, re-checking the pool after a kill) goes through the
//! [`Scheduler`] and runs on the next [`PeerPool::process_ready`].

use std::time::Duration;

use tlsp2p_net_peer::{
    Candidate, HandleId, Link, PeerConnState, PeerEvent, PeerEventSink, PeerHandle, PeerId,
    PeerSpec, Target, Transport, TransportInput,
};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::available::AvailablePool;
use crate::broadcast::PeerReply;
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::events::{EventEmitter, PoolEvent, PoolStatus, Severity};
use crate::health::{OverflowPolicy, WarnOnly};
use crate::ledger::BadPeerLedger;
use crate::live::{LiveEntry, LiveSet};
use crate::scheduler::{Scheduler, Task, Timer, TimerId};
use crate::state::PoolState;

/// Outcome of a batch admission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddReport {
    /// Candidates promoted straight into the live set.
    pub live: usize,
    /// Candidates queued in the available pool.
    pub pooled: usize,
    /// Malformed, penalized, duplicate or already live candidates.
    pub skipped: usize,
}

/// Encrypted peer connection pool.
pub struct PeerPool<T: Transport> {
    pub(crate) config: PoolConfig,
    pub(crate) transport: T,
    pub(crate) state: PoolState,
    /// Set by the first successful connection, inbound or outbound.
    pub(crate) has_connected: bool,
    pub(crate) listening: bool,
    pub(crate) live: LiveSet<T::Peer>,
    pub(crate) available: AvailablePool<T::Stream>,
    pub(crate) ledger: BadPeerLedger,
    pub(crate) scheduler: Scheduler,
    pub(crate) events: EventEmitter,
    pub(crate) overflow: Box<dyn OverflowPolicy>,
    pub(crate) health_timer: Option<TimerId>,
    status_timer: Option<TimerId>,
    next_handle: HandleId,
    pub(crate) input_tx: mpsc::UnboundedSender<TransportInput<T::Stream>>,
    input_rx: mpsc::UnboundedReceiver<TransportInput<T::Stream>>,
}

impl<T: Transport> PeerPool<T> {
    pub fn new(config: PoolConfig, transport: T) -> Result<Self, PoolError> {
        config.validate()?;
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            transport,
            state: PoolState::New,
            has_connected: false,
            listening: false,
            live: LiveSet::default(),
            available: AvailablePool::new(),
            ledger: BadPeerLedger::new(),
            scheduler: Scheduler::new(),
            events: EventEmitter::default(),
            overflow: Box::new(WarnOnly),
            health_timer: None,
            status_timer: None,
            next_handle: HandleId::new(0),
            input_tx,
            input_rx,
        })
    }

    /// Replaces the policy consulted when the live count exceeds `max_peers`.
    pub fn with_overflow_policy(mut self, policy: impl OverflowPolicy + 'static) -> Self {
        self.overflow = Box::new(policy);
        self
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, id: &PeerId) -> bool {
        self.live.contains(id)
    }

    pub fn live_ids(&self) -> Vec<PeerId> {
        let mut ids = self.live.ids();
        ids.sort();
        ids
    }

    /// Transport state of a live peer.
    pub fn peer_state(&self, id: &PeerId) -> Option<PeerConnState> {
        self.live.get(id).map(|entry| entry.peer.state())
    }

    pub fn pool_size(&self) -> usize {
        self.available.len()
    }

    /// Queued identities, oldest first.
    pub fn available_ids(&self) -> Vec<PeerId> {
        self.available.ids().cloned().collect()
    }

    /// Remaining admission penalty for `id`, if any.
    pub fn penalty(&self, id: &PeerId) -> Option<Duration> {
        self.ledger.remaining(id)
    }

    /// Penalizes `id` for `penalty` on top of any remaining penalty and drops it
    /// from the available pool.
    pub fn warn(&mut self, id: &PeerId, penalty: Duration) -> Duration {
        self.available.remove(id);
        self.ledger.warn(id, penalty)
    }

    /// Enters `initiating`, seeds the pool, opens the listener if configured,
    /// and starts the health and status timers. Only a `new` pool initiates.
    pub fn initiate(&mut self, seeds: Vec<Candidate<T::Stream>>) {
        if !self.state.is_new() {
            debug!(state = %self.state, "initiate ignored; pool already started");
            return;
        }
        self.set_state(PoolState::Initiating);
        if self.has_connected {
            // A connection completed before initiation; nothing else will move us on.
            self.set_state(PoolState::Running);
        }

        if !seeds.is_empty() {
            self.add_pool(seeds);
        }
        if self.config.listen {
            self.open_listener();
        }
        self.scheduler.defer(Task::CheckPeers);
        self.arm_status_timer();
    }

    /// Offers candidates to the pool.
    ///
    /// While the live count is under the current target (`target_peers` while
    /// initiating, `min_peers` afterwards) candidates are connected immediately;
    /// the rest are queued in arrival order, one entry per identity.
    pub fn add_pool(&mut self, candidates: Vec<Candidate<T::Stream>>) -> AddReport {
        let mut report = AddReport::default();
        if self.state.is_shutdown() {
            report.skipped = candidates.len();
            return report;
        }

        let target = if self.state.is_initiating() {
            self.config.initial_target()
        } else {
            self.config.min_peers
        };
        for candidate in candidates {
            let Some(target_peer) = self.admit(candidate) else {
                report.skipped += 1;
                continue;
            };
            if self.live.contains(&target_peer.id) {
                trace!(id = %target_peer.id, "candidate already live");
                report.skipped += 1;
            } else if self.live.len() < target {
                if self.connect(target_peer) {
                    report.live += 1;
                }
            } else if self.available.push(target_peer) {
                report.pooled += 1;
            } else {
                report.skipped += 1;
            }
        }
        debug!(?report, pool_size = self.available.len(), "pool candidates added");
        report
    }

    /// Connects to every admissible candidate that is not already live.
    ///
    /// The live count grows immediately, before any handshake completes.
    pub fn add_live(&mut self, candidates: Vec<Candidate<T::Stream>>) -> AddReport {
        let mut report = AddReport::default();
        if self.state.is_shutdown() {
            report.skipped = candidates.len();
            return report;
        }

        for candidate in candidates {
            let Some(target_peer) = self.admit(candidate) else {
                report.skipped += 1;
                continue;
            };
            if self.live.contains(&target_peer.id) {
                report.skipped += 1;
                continue;
            }
            if self.connect(target_peer) {
                report.live += 1;
            }
        }
        report
    }

    /// Removes a live peer.
    ///
    /// A peer that is not yet on its way out is hung up on gracefully instead;
    /// the close that follows finalizes it. Unknown peers are ignored.
    pub fn kill(&mut self, id: &PeerId, reason: Option<&str>) {
        let Some(entry) = self.live.get(id) else {
            trace!(%id, "kill ignored; peer not live");
            return;
        };
        let state = entry.peer.state();
        if !state.is_closing() {
            let message = match reason {
                Some(reason) => format!("Disconnecting from {id} ({state}); {reason}"),
                None => format!("Disconnecting from {id} ({state})"),
            };
            self.events.report(Severity::Info, message);
            self.disconnect(id);
            return;
        }

        let Some(mut entry) = self.live.remove(id) else {
            return;
        };
        self.cancel_peer_timers(&mut entry);
        entry.peer.destroy();

        let active = self.live.len();
        let message = match reason {
            Some(reason) => format!("{id} closed; {reason}. {active} active peers now"),
            None => format!("{id} closed; {active} active peers now"),
        };
        self.events.report(Severity::Info, message);

        if !self.state.is_shutdown() {
            self.scheduler.defer(Task::CheckPeers);
        }
    }

    /// Stops admissions, closes the listener and hangs up on every live peer.
    pub fn shutdown(&mut self) {
        self.set_state(PoolState::Shutdown);
        for timer in [self.health_timer.take(), self.status_timer.take()]
            .into_iter()
            .flatten()
        {
            self.scheduler.cancel(timer);
        }
        if self.listening {
            self.transport.close_listener();
            self.listening = false;
            debug!("listener closed");
        }
        for id in self.live_ids() {
            self.events
                .report(Severity::Notice, format!("Disconnecting {id}"));
            self.disconnect(&id);
        }
    }

    /// Emits and returns a `status` snapshot.
    pub fn status(&self) -> PoolStatus {
        let status = PoolStatus {
            num_active: self.live.len(),
            pool_size: self.available.len(),
            bad_peers: self.ledger.snapshot(),
        };
        self.events.emit(PoolEvent::Status(status.clone()));
        status
    }

    /// Runs every deferred task, due timer and queued transport input until
    /// nothing is ready.
    pub fn process_ready(&mut self) {
        loop {
            if let Some(task) = self.scheduler.next_task() {
                self.run_task(task);
                continue;
            }
            if let Some(timer) = self.scheduler.pop_due(Instant::now()) {
                self.fire(timer);
                continue;
            }
            match self.input_rx.try_recv() {
                Ok(input) => self.handle_input(input),
                Err(_) => break,
            }
        }
    }

    /// Earliest pending timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Waits for the next transport input.
    pub async fn next_input(&mut self) -> Option<TransportInput<T::Stream>> {
        self.input_rx.recv().await
    }

    /// Shut down with nothing left in the live set.
    pub fn is_drained(&self) -> bool {
        self.state.is_shutdown() && self.live.is_empty()
    }

    pub fn handle_input(&mut self, input: TransportInput<T::Stream>) {
        match input {
            TransportInput::Peer { handle, id, event } => self.on_peer_event(&id, handle, event),
            TransportInput::Inbound { remote, stream } => self.accept_inbound(remote, stream),
        }
    }

    pub(crate) fn set_state(&mut self, new: PoolState) {
        let old = self.state;
        if !old.can_become(new) {
            debug!(%old, %new, "state change ignored after shutdown");
            return;
        }
        self.state = new;
        debug!(%old, %new, "pool state changed");
        self.events.state_changed(old, new);
    }

    /// First successful connection moves an initiating pool to `running`, once.
    /// A connection made before `initiate` is remembered and applied there.
    pub(crate) fn mark_connected(&mut self) {
        if self.has_connected {
            return;
        }
        self.has_connected = true;
        if self.state.is_initiating() {
            self.set_state(PoolState::Running);
        }
    }

    /// Normalizes a candidate and applies the bad peer gate.
    pub(crate) fn admit(&mut self, candidate: Candidate<T::Stream>) -> Option<Target<T::Stream>> {
        let target = match candidate.normalize(self.config.port) {
            Ok(target) => target,
            Err(error) => {
                debug!(%error, "candidate rejected");
                return None;
            }
        };
        if self.ledger.is_penalized(&target.id) {
            debug!(id = %target.id, "candidate rejected; penalty active");
            return None;
        }
        Some(target)
    }

    /// Creates a handle for `id` bound to a fresh [`HandleId`].
    pub(crate) fn open_handle(
        &mut self,
        id: &PeerId,
        link: Link<T::Stream>,
    ) -> (HandleId, T::Peer) {
        let handle = self.next_handle.bump();
        let sink = PeerEventSink::new(handle, id.clone(), self.input_tx.clone());
        let spec = PeerSpec {
            id: id.clone(),
            magic: self.config.magic,
            link,
        };
        (handle, self.transport.open(spec, sink))
    }

    /// Registers an outbound handle; the handshake starts on the next turn.
    pub(crate) fn connect(&mut self, target: Target<T::Stream>) -> bool {
        let Target { id, socket, stream } = target;
        self.available.remove(&id);

        let (handle, peer) = self.open_handle(&id, Link::from_parts(socket, stream));
        if let Err(mut rejected) = self.live.insert(id.clone(), LiveEntry::new(handle, peer, false)) {
            rejected.peer.destroy();
            return false;
        }
        debug!(%id, %handle, live = self.live.len(), "outbound peer registered");
        self.scheduler.defer(Task::Connect { id, handle });
        true
    }

    /// Marks a peer as disconnecting, asks it to close and arms the fallback.
    pub(crate) fn disconnect(&mut self, id: &PeerId) {
        let window = self.config.connect_timeout();
        let Some(entry) = self.live.get_mut(id) else {
            return;
        };
        entry.peer.set_state(PeerConnState::Disconnecting);
        entry.peer.disconnect();

        for timer in [entry.connect_timer.take(), entry.close_timer.take()]
            .into_iter()
            .flatten()
        {
            self.scheduler.cancel(timer);
        }
        let fallback = Timer::CloseFallback {
            id: id.clone(),
            handle: entry.handle,
        };
        entry.close_timer = Some(self.scheduler.schedule(window, fallback));
        debug!(%id, "disconnecting");
    }

    fn cancel_peer_timers(&mut self, entry: &mut LiveEntry<T::Peer>) {
        for timer in [entry.connect_timer.take(), entry.close_timer.take()]
            .into_iter()
            .flatten()
        {
            self.scheduler.cancel(timer);
        }
    }

    fn arm_status_timer(&mut self) {
        if self.state.is_shutdown() {
            return;
        }
        if let Some(timer) = self.status_timer.take() {
            self.scheduler.cancel(timer);
        }
        let interval = self.config.status_interval();
        self.status_timer = Some(self.scheduler.schedule(interval, Timer::Status));
    }

    fn run_task(&mut self, task: Task) {
        match task {
            Task::Connect { id, handle } => self.start_connect(&id, handle),
            Task::CheckPeers => self.check_peers(),
        }
    }

    fn fire(&mut self, timer: Timer) {
        match timer {
            Timer::ConnectTimeout { id, handle } => self.connect_timed_out(&id, handle),
            Timer::CloseFallback { id, handle } => self.close_fallback(&id, handle),
            Timer::HealthCheck => {
                self.health_timer = None;
                self.check_peers();
            }
            Timer::Status => {
                self.status_timer = None;
                self.status();
                self.arm_status_timer();
            }
        }
    }

    fn start_connect(&mut self, id: &PeerId, handle: HandleId) {
        let timeout = self.config.connect_timeout();
        let Some(entry) = self.live.current_mut(id, handle) else {
            trace!(%id, %handle, "connect skipped; handle no longer live");
            return;
        };
        if entry.peer.state().is_closing() {
            return;
        }
        self.events
            .report(Severity::Notice, format!("Attempting to connect to {id}"));
        entry.peer.connect();

        let timer = Timer::ConnectTimeout {
            id: id.clone(),
            handle,
        };
        entry.connect_timer = Some(self.scheduler.schedule(timeout, timer));
    }

    fn connect_timed_out(&mut self, id: &PeerId, handle: HandleId) {
        let penalty = self.config.error_penalty();
        let Some(entry) = self.live.current_mut(id, handle) else {
            return;
        };
        entry.connect_timer = None;
        if entry.peer.state() != PeerConnState::Connecting {
            return;
        }
        entry.peer.set_state(PeerConnState::Closed);
        self.warn(id, penalty);
        self.kill(id, Some("didn't respond to connection attempt; force-closing"));
    }

    fn close_fallback(&mut self, id: &PeerId, handle: HandleId) {
        let Some(entry) = self.live.current_mut(id, handle) else {
            return;
        };
        entry.close_timer = None;
        self.events.report(
            Severity::Notice,
            format!("{id} didn't close on their own; force-closing"),
        );
        // The handle raises `Close`, which finalizes through `kill`.
        entry.peer.destroy();
    }

    fn on_peer_event(&mut self, id: &PeerId, handle: HandleId, event: PeerEvent) {
        let Some(entry) = self.live.current_mut(id, handle) else {
            trace!(%id, %handle, ?event, "event from stale handle dropped");
            return;
        };
        let closing = entry.peer.state().is_closing();

        match event {
            PeerEvent::Connect => {
                if let Some(timer) = entry.connect_timer.take() {
                    self.scheduler.cancel(timer);
                }
                debug!(%id, "peer connected");
                self.mark_connected();
                self.events.emit(PoolEvent::PeerConnect { peer: id.clone() });
            }
            PeerEvent::End => {
                self.events.emit(PoolEvent::PeerEnd { peer: id.clone() });
                if !closing {
                    self.disconnect(id);
                }
            }
            PeerEvent::Error(error) => {
                debug!(%id, %error, "peer error");
                self.events.emit(PoolEvent::PeerError {
                    peer: id.clone(),
                    error,
                });
                let penalty = self.config.error_penalty();
                self.warn(id, penalty);
                if !closing {
                    self.disconnect(id);
                }
            }
            PeerEvent::Message { command, payload } => {
                let (fired, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut entry.replies)
                    .into_iter()
                    .partition(|route| route.command == command);
                entry.replies = pending;
                for route in fired {
                    let _ = route.tx.send(PeerReply {
                        peer: id.clone(),
                        command: command.clone(),
                        payload: payload.clone(),
                    });
                }
                self.events.message(id.clone(), command, payload);
            }
            PeerEvent::Close => {
                if !closing {
                    entry.peer.set_state(PeerConnState::Closed);
                }
                self.kill(id, Some("remote connection closed"));
            }
        }
    }
}

impl<T: Transport> std::fmt::Debug for PeerPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerPool")
            .field("state", &self.state)
            .field("live", &self.live.len())
            .field("available", &self.available.len())
            .field("bad_peers", &self.ledger.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bytes::Bytes;
    use tokio::sync::mpsc::error::TryRecvError;

    use super::*;
    use crate::broadcast::{PeerFilter, ReplyRoute, SendRequest};
    use crate::test_utils::{MockCall, MockTransport, drain, error_messages, peer_id};

    const CONNECT_WINDOW: Duration = Duration::from_secs(5);

    fn config() -> PoolConfig {
        PoolConfig {
            min_peers: 3,
            target_peers: Some(5),
            max_peers: 8,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_pool_promotes_below_target() {
        let net = MockTransport::default();
        let mut pool = net.pool(config());

        let report = pool.add_pool(vec!["10.0.0.1:8333".into()]);

        assert_eq!(report.live, 1);
        assert_eq!(pool.live_count(), 1);
        assert!(pool.is_live(&peer_id("10.0.0.1")));
        assert_eq!(pool.pool_size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_pool_queues_at_target_and_dedups() {
        let net = MockTransport::default();
        let mut pool = net.pool(config());

        let report = pool.add_pool(Candidate::parse_batch(
            "10.0.0.1|10.0.0.2|10.0.0.3|10.0.0.4|10.0.0.5|10.0.0.4|10.0.0.1",
        ));

        // min_peers applies outside of initiation
        assert_eq!(report.live, 3);
        assert_eq!(report.pooled, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(pool.available_ids(), [peer_id("10.0.0.4"), peer_id("10.0.0.5")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_pool_uses_target_while_initiating() {
        let net = MockTransport::default();
        let mut pool = net.pool(config());

        pool.initiate(Candidate::parse_batch(
            "10.0.0.1|10.0.0.2|10.0.0.3|10.0.0.4|10.0.0.5|10.0.0.6",
        ));

        assert_eq!(pool.live_count(), 5);
        assert_eq!(pool.available_ids(), [peer_id("10.0.0.6")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_live_skips_live_and_counts_in_flight() {
        let net = MockTransport::default();
        let mut pool = net.pool(config());

        let first = pool.add_live(vec!["10.0.0.1".into(), "10.0.0.2".into()]);
        let second = pool.add_live(vec!["10.0.0.2".into(), "bad:port".into()]);

        assert_eq!(first.live, 2);
        assert_eq!(second, AddReport { live: 0, pooled: 0, skipped: 2 });
        assert_eq!(pool.live_count(), 2);
        assert_eq!(net.handles_opened(&peer_id("10.0.0.2")), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_promotion_removes_from_available() {
        let net = MockTransport::default();
        let mut pool = net.pool(PoolConfig {
            min_peers: 0,
            ..config()
        });

        pool.add_pool(vec!["10.0.0.1".into()]);
        assert_eq!(pool.pool_size(), 1);

        pool.add_live(vec!["10.0.0.1".into()]);
        assert!(pool.is_live(&peer_id("10.0.0.1")));
        assert_eq!(pool.pool_size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_deferred() {
        let net = MockTransport::default();
        let mut pool = net.pool(config());
        let mut events = pool.subscribe();
        let id = peer_id("10.0.0.1");

        pool.add_live(vec!["10.0.0.1".into()]);
        assert!(net.calls(&id).is_empty());

        pool.process_ready();
        assert_eq!(net.calls(&id), [MockCall::Connect]);
        assert_eq!(pool.peer_state(&id), Some(PeerConnState::Connecting));
        assert!(
            error_messages(&drain(&mut events))
                .contains(&"Attempting to connect to 10.0.0.1~8333".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_kills_and_penalizes() {
        let net = MockTransport::default();
        let mut pool = net.pool(config());
        let mut events = pool.subscribe();
        let id = peer_id("10.0.0.1");

        pool.add_live(vec!["10.0.0.1".into()]);
        pool.process_ready();

        tokio::time::advance(CONNECT_WINDOW).await;
        pool.process_ready();

        assert!(!pool.is_live(&id));
        assert!(net.calls(&id).contains(&MockCall::Destroy));
        assert_eq!(pool.penalty(&id), Some(Duration::from_secs(600)));
        assert!(error_messages(&drain(&mut events)).contains(
            &"10.0.0.1~8333 closed; didn't respond to connection attempt; force-closing. 0 active peers now"
                .to_string()
        ));

        // Penalized identities are refused
        assert_eq!(pool.add_live(vec!["10.0.0.1".into()]).skipped, 1);
        assert_eq!(pool.add_pool(vec!["10.0.0.1".into()]).skipped, 1);
        assert!(!pool.is_live(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connected_peer_survives_connect_window() {
        let net = MockTransport::default();
        let mut pool = net.pool(config());
        let id = peer_id("10.0.0.1");

        pool.add_live(vec!["10.0.0.1".into()]);
        pool.process_ready();
        net.connect(&id);
        pool.process_ready();

        tokio::time::advance(CONNECT_WINDOW * 2).await;
        pool.process_ready();

        assert_eq!(pool.peer_state(&id), Some(PeerConnState::Connected));
        assert_eq!(pool.penalty(&id), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_kill_hangs_up_then_finalizes() {
        let net = MockTransport::default();
        let mut pool = net.pool(config());
        let id = peer_id("10.0.0.1");
        pool.add_live(vec!["10.0.0.1".into()]);
        pool.process_ready();
        net.connect(&id);
        pool.process_ready();

        pool.kill(&id, Some("testing"));
        assert_eq!(pool.peer_state(&id), Some(PeerConnState::Disconnecting));
        assert!(net.calls(&id).contains(&MockCall::Disconnect));
        assert_eq!(pool.live_count(), 1);

        pool.kill(&id, None);
        assert!(!pool.is_live(&id));
        assert_eq!(pool.live_count(), 0);

        // Second kill of a removed peer is a no-op
        let calls = net.calls(&id);
        pool.kill(&id, None);
        assert_eq!(net.calls(&id), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_graceful_close_falls_back_to_destroy() {
        let net = MockTransport::default();
        let mut pool = net.pool(config());
        let mut events = pool.subscribe();
        let id = peer_id("10.0.0.1");
        pool.add_live(vec!["10.0.0.1".into()]);
        pool.process_ready();
        net.connect(&id);
        pool.process_ready();

        pool.kill(&id, None);
        tokio::time::advance(CONNECT_WINDOW - Duration::from_millis(1)).await;
        pool.process_ready();
        assert!(pool.is_live(&id));

        tokio::time::advance(Duration::from_millis(1)).await;
        pool.process_ready();
        assert!(!pool.is_live(&id));

        let messages = error_messages(&drain(&mut events));
        assert!(messages.contains(&"10.0.0.1~8333 didn't close on their own; force-closing".to_string()));
        assert!(messages.contains(&"10.0.0.1~8333 closed; remote connection closed. 0 active peers now".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_end_disconnects() {
        let net = MockTransport::default();
        let mut pool = net.pool(config());
        let mut events = pool.subscribe();
        let id = peer_id("10.0.0.1");
        pool.add_live(vec!["10.0.0.1".into()]);
        pool.process_ready();
        net.connect(&id);
        net.emit(&id, PeerEvent::End);
        pool.process_ready();

        assert_eq!(pool.peer_state(&id), Some(PeerConnState::Disconnecting));
        assert_eq!(pool.penalty(&id), None);
        assert!(drain(&mut events).iter().any(|e| matches!(e, PoolEvent::PeerEnd { .. })));

        net.emit(&id, PeerEvent::Close);
        pool.process_ready();
        assert!(!pool.is_live(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_error_penalizes_and_disconnects() {
        let net = MockTransport::default();
        let mut pool = net.pool(config());
        let mut events = pool.subscribe();
        let id = peer_id("10.0.0.1");
        pool.add_live(vec!["10.0.0.1".into()]);
        pool.process_ready();
        net.emit(&id, PeerEvent::Error("connection reset".into()));
        pool.process_ready();

        assert_eq!(pool.peer_state(&id), Some(PeerConnState::Disconnecting));
        assert_eq!(pool.penalty(&id), Some(Duration::from_secs(600)));
        assert!(drain(&mut events).iter().any(|e| matches!(
            e,
            PoolEvent::PeerError { error, .. } if error == "connection reset"
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsolicited_close_removes_peer() {
        let net = MockTransport::default();
        let mut pool = net.pool(config());
        let id = peer_id("10.0.0.1");
        pool.add_live(vec!["10.0.0.1".into()]);
        pool.process_ready();
        net.connect(&id);
        net.emit(&id, PeerEvent::Close);
        pool.process_ready();

        assert!(!pool.is_live(&id));
        assert_eq!(pool.live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_handle_events_ignored() {
        let net = MockTransport::default();
        let mut pool = net.pool(PoolConfig {
            min_peers: 0,
            ..config()
        });
        let id = peer_id("10.0.0.1");
        pool.add_live(vec!["10.0.0.1".into()]);
        pool.process_ready();
        net.emit(&id, PeerEvent::Close);
        pool.process_ready();
        assert!(!pool.is_live(&id));

        pool.add_live(vec!["10.0.0.1".into()]);
        pool.process_ready();
        net.emit_from(&id, 0, PeerEvent::Error("late".into()));
        net.emit_from(&id, 0, PeerEvent::Close);
        pool.process_ready();

        assert_eq!(net.handles_opened(&id), 2);
        assert_eq!(pool.peer_state(&id), Some(PeerConnState::Connecting));
        assert_eq!(pool.penalty(&id), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_kill_schedules_replenishment() {
        let net = MockTransport::default();
        let mut pool = net.pool(PoolConfig {
            min_peers: 1,
            ..config()
        });
        let first = peer_id("10.0.0.1");
        pool.add_pool(vec!["10.0.0.1".into(), "10.0.0.2".into()]);
        pool.process_ready();
        assert_eq!(pool.available_ids(), [peer_id("10.0.0.2")]);

        net.emit(&first, PeerEvent::Close);
        pool.process_ready();

        assert!(pool.is_live(&peer_id("10.0.0.2")));
        assert_eq!(pool.pool_size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_machine_transitions() {
        let net = MockTransport::default();
        let mut pool = net.pool(config());
        let mut events = pool.subscribe();

        pool.initiate(vec!["10.0.0.1".into(), "10.0.0.2".into()]);
        pool.process_ready();
        net.connect(&peer_id("10.0.0.1"));
        net.connect(&peer_id("10.0.0.2"));
        pool.process_ready();
        pool.shutdown();
        pool.shutdown();

        let changes: Vec<_> = drain(&mut events)
            .into_iter()
            .filter_map(|event| match event {
                PoolEvent::StateChange { old, new } => Some((old, new)),
                _ => None,
            })
            .collect();
        assert_eq!(
            changes,
            [
                (PoolState::New, PoolState::Initiating),
                (PoolState::Initiating, PoolState::Running),
                (PoolState::Running, PoolState::Shutdown),
                (PoolState::Shutdown, PoolState::Shutdown),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_and_refuses_admission() {
        let net = MockTransport::default();
        let mut pool = net.pool(config());
        pool.initiate(Candidate::parse_batch("10.0.0.1|10.0.0.2|10.0.0.3"));
        pool.process_ready();
        net.connect(&peer_id("10.0.0.1"));
        pool.process_ready();

        pool.shutdown();
        assert_eq!(pool.state(), PoolState::Shutdown);
        for id in pool.live_ids() {
            assert_eq!(pool.peer_state(&id), Some(PeerConnState::Disconnecting));
        }
        assert_eq!(pool.add_live(vec!["10.0.0.9".into()]).skipped, 1);
        assert_eq!(pool.add_pool(vec!["10.0.0.9".into()]).skipped, 1);

        tokio::time::advance(CONNECT_WINDOW).await;
        pool.process_ready();

        assert!(pool.is_drained());
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.next_deadline(), None);

        // A late connection never revives the pool
        pool.initiate(vec![]);
        assert_eq!(pool.state(), PoolState::Shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_bubble_up() {
        let net = MockTransport::default();
        let mut pool = net.pool(config());
        let mut events = pool.subscribe();
        let id = peer_id("10.0.0.1");
        pool.add_live(vec!["10.0.0.1".into()]);
        pool.process_ready();
        net.connect(&id);
        net.emit(&id, PeerEvent::message("addr", &b"payload"[..]));
        pool.process_ready();

        let names: Vec<_> = drain(&mut events)
            .iter()
            .filter(|event| !event.is_error())
            .map(|event| event.name().into_owned())
            .collect();
        assert_eq!(names, ["peerConnect", "message", "addrMessage"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_initiate_is_ignored() {
        let net = MockTransport::default();
        let mut pool = net.pool(config());
        let mut events = pool.subscribe();

        pool.initiate(vec!["10.0.0.1".into()]);
        pool.process_ready();
        net.connect(&peer_id("10.0.0.1"));
        pool.process_ready();
        let timers = pool.scheduler.pending_timers();

        pool.initiate(vec!["10.0.0.2".into()]);

        assert_eq!(pool.state(), PoolState::Running);
        assert!(!pool.is_live(&peer_id("10.0.0.2")));
        assert_eq!(pool.scheduler.pending_timers(), timers);
        let changes: Vec<_> = drain(&mut events)
            .into_iter()
            .filter_map(|event| match event {
                PoolEvent::StateChange { old, new } => Some((old, new)),
                _ => None,
            })
            .collect();
        assert_eq!(
            changes,
            [
                (PoolState::New, PoolState::Initiating),
                (PoolState::Initiating, PoolState::Running),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_before_initiate_runs_on_initiate() {
        let net = MockTransport::default();
        let mut pool = net.pool(config());
        let id = peer_id("10.0.0.1");
        pool.add_live(vec!["10.0.0.1".into()]);
        pool.process_ready();
        net.connect(&id);
        pool.process_ready();
        assert_eq!(pool.state(), PoolState::New);

        pool.initiate(vec![]);
        assert_eq!(pool.state(), PoolState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_repeats_every_interval() {
        let net = MockTransport::default();
        let mut pool = net.pool(PoolConfig {
            min_peers: 0,
            target_peers: Some(0),
            ..config()
        });
        let mut events = pool.subscribe();
        pool.initiate(vec!["10.0.0.1".into(), "10.0.0.2".into()]);
        pool.warn(&peer_id("10.0.0.9"), Duration::from_secs(600));
        pool.process_ready();

        let interval = pool.config().status_interval();
        tokio::time::advance(interval).await;
        pool.process_ready();
        tokio::time::advance(interval).await;
        pool.process_ready();

        let statuses: Vec<PoolStatus> = drain(&mut events)
            .into_iter()
            .filter_map(|event| match event {
                PoolEvent::Status(status) => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].num_active, 0);
        assert_eq!(statuses[0].pool_size, 2);
        assert_eq!(statuses[0].bad_peers.len(), 1);
        assert_eq!(statuses[0].bad_peers[0].remaining, Duration::from_secs(540));
        assert_eq!(statuses[1].bad_peers[0].remaining, Duration::from_secs(480));
    }

    #[tokio::test(start_paused = true)]
    async fn test_kill_drops_pending_reply_route() {
        let net = MockTransport::default();
        let mut pool = net.pool(config());
        let id = peer_id("10.0.0.1");
        pool.add_live(vec!["10.0.0.1".into()]);
        pool.process_ready();
        net.connect(&id);
        pool.process_ready();

        let (route, mut replies) = ReplyRoute::new("pong");
        pool.send(SendRequest::new(PeerFilter::connected(), "ping", Bytes::new()).reply(route))
            .unwrap();
        assert_matches!(replies.try_recv(), Err(TryRecvError::Empty));

        pool.kill(&id, None);
        net.emit(&id, PeerEvent::Close);
        pool.process_ready();

        assert!(!pool.is_live(&id));
        assert_matches!(replies.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_warn_drops_queued_candidate() {
        let net = MockTransport::default();
        let mut pool = net.pool(PoolConfig {
            min_peers: 0,
            ..config()
        });
        let id = peer_id("10.0.0.1");
        pool.add_pool(vec!["10.0.0.1".into()]);
        assert_eq!(pool.pool_size(), 1);

        pool.warn(&id, Duration::from_secs(600));

        assert!(pool.available_ids().is_empty());
        assert_eq!(pool.status().pool_size, 0);
        assert_eq!(pool.penalty(&id), Some(Duration::from_secs(600)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_error_penalty_is_absorbed() {
        let net = MockTransport::default();
        let mut pool = net.pool(PoolConfig {
            error_penalty_mins: u64::MAX / 10,
            ..config()
        });
        let id = peer_id("10.0.0.1");
        pool.add_live(vec!["10.0.0.1".into()]);
        pool.process_ready();

        net.emit(&id, PeerEvent::Error("reset".into()));
        net.emit(&id, PeerEvent::Error("reset again".into()));
        pool.process_ready();

        assert_eq!(pool.peer_state(&id), Some(PeerConnState::Disconnecting));
        assert_eq!(pool.penalty(&id), Some(Duration::MAX));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = PeerPool::new(
            PoolConfig {
                min_peers: 10,
                max_peers: 1,
                ..Default::default()
            },
            MockTransport::default(),
        );
        assert_matches!(result, Err(PoolError::Config(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_payload_reaches_handle() {
        let net = MockTransport::default();
        let mut pool = net.pool(config());
        let id = peer_id("10.0.0.1");
        pool.add_live(vec!["10.0.0.1".into()]);
        pool.process_ready();
        net.connect(&id);
        pool.process_ready();

        pool.send(SendRequest::new(
            PeerFilter::new("host", ["10.0.0.1"]),
            "getaddr",
            Bytes::new(),
        ))
        .unwrap();
        assert!(net.calls(&id).contains(&MockCall::Send("getaddr".into(), Bytes::new())));
    }
}
