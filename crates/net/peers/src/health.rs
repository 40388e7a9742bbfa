//! Health monitor: idle sweep, minimum replenishment and overflow check.

use auto_impl::auto_impl;
use tlsp2p_net_peer::{PeerConnState, PeerHandle, PeerId, Transport};
use tokio::time::Instant;
use tracing::debug;

use crate::events::Severity;
use crate::manager::PeerPool;
use crate::scheduler::Timer;

/// What an [`OverflowPolicy`] gets to see about each live peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivePeerInfo {
    pub id: PeerId,
    pub state: PeerConnState,
    pub last_seen: Option<Instant>,
    pub inbound: bool,
}

/// Chooses which peers to drop when the live count exceeds `max_peers`.
#[auto_impl(Box, Arc)]
pub trait OverflowPolicy: Send + Sync {
    /// Returns up to `excess` identities to kill.
    fn select(&self, live: &[LivePeerInfo], excess: usize) -> Vec<PeerId>;
}

/// Reports the overflow and keeps every peer.
#[derive(Debug, Clone, Copy, Default)]
pub struct WarnOnly;

impl OverflowPolicy for WarnOnly {
    fn select(&self, _live: &[LivePeerInfo], _excess: usize) -> Vec<PeerId> {
        Vec::new()
    }
}

/// Drops the peers that have been quiet the longest. Peers never heard from go last.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvictIdlest;

impl OverflowPolicy for EvictIdlest {
    fn select(&self, live: &[LivePeerInfo], excess: usize) -> Vec<PeerId> {
        let mut candidates: Vec<_> = live
            .iter()
            .filter(|peer| !peer.state.is_closing())
            .filter_map(|peer| peer.last_seen.map(|seen| (seen, &peer.id)))
            .collect();
        candidates.sort();
        candidates
            .into_iter()
            .take(excess)
            .map(|(_, id)| id.clone())
            .collect()
    }
}

impl<T: Transport> PeerPool<T> {
    /// One health monitor run. Re-arms itself first; does nothing after shutdown.
    pub(crate) fn check_peers(&mut self) {
        if self.state.is_shutdown() {
            return;
        }
        if let Some(timer) = self.health_timer.take() {
            self.scheduler.cancel(timer);
        }
        let interval = self.config.check_interval();
        self.health_timer = Some(self.scheduler.schedule(interval, Timer::HealthCheck));

        self.sweep_idle();
        if !self.replenish() {
            return;
        }
        self.check_overflow();
    }

    fn sweep_idle(&mut self) {
        let now = Instant::now();
        let idle_timeout = self.config.idle_timeout();
        let mut idle: Vec<PeerId> = self
            .live
            .iter()
            .filter(|(_, entry)| !entry.peer.state().is_closing())
            .filter(|(_, entry)| {
                entry
                    .peer
                    .last_seen()
                    .is_some_and(|seen| now.saturating_duration_since(seen) > idle_timeout)
            })
            .map(|(id, _)| id.clone())
            .collect();
        idle.sort();

        for id in idle {
            self.events.report(
                Severity::Info,
                format!("{id} has been quiet too long; disconnecting"),
            );
            self.disconnect(&id);
        }
    }

    /// Pulls from the available pool up to `min_peers`. Returns `false` when the
    /// pool ran dry first.
    fn replenish(&mut self) -> bool {
        let min_peers = self.config.min_peers;
        if self.live.len() >= min_peers {
            return true;
        }

        self.events.report(
            Severity::Info,
            format!(
                "Too few active peers ({} < {min_peers}); pulling more from pool",
                self.live.len()
            ),
        );
        while self.live.len() < min_peers {
            let Some(target) = self.available.pop_front() else {
                self.events
                    .report(Severity::Info, "No more pooled peers...");
                return false;
            };
            if self.live.contains(&target.id) || self.ledger.is_penalized(&target.id) {
                debug!(id = %target.id, "skipping pooled candidate");
                continue;
            }
            self.connect(target);
        }
        true
    }

    fn check_overflow(&mut self) {
        let max_peers = self.config.max_peers;
        let active = self.live.len();
        if active <= max_peers {
            return;
        }

        self.events.report(
            Severity::Warning,
            format!("Number of active peers above the maximum ({active} > {max_peers})"),
        );

        let mut snapshot: Vec<LivePeerInfo> = self
            .live
            .iter()
            .map(|(id, entry)| LivePeerInfo {
                id: id.clone(),
                state: entry.peer.state(),
                last_seen: entry.peer.last_seen(),
                inbound: entry.inbound,
            })
            .collect();
        snapshot.sort_by(|a, b| a.id.cmp(&b.id));

        let excess = active - max_peers;
        let evict = self.overflow.select(&snapshot, excess);
        debug!(excess, selected = evict.len(), "overflow policy consulted");
        for id in evict.into_iter().take(excess) {
            self.kill(&id, Some("above maximum peer count"));
        }
    }
}
