//! Bad peer ledger: time-decaying admission penalties.
//!
//! Expiry is lazy. An entry is only dropped when it is looked up after its
//! penalty has fully elapsed.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tlsp2p_net_peer::PeerId;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Penalty record for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadPeerEntry {
    pub host: String,
    pub port: u16,
    /// When the current penalty window started.
    pub since: Instant,
    pub penalty: Duration,
}

impl BadPeerEntry {
    fn remaining_at(&self, now: Instant) -> Duration {
        self.penalty
            .saturating_sub(now.saturating_duration_since(self.since))
    }

    fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.since) > self.penalty
    }
}

/// Point-in-time view of a penalty, as reported by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadPeerSnapshot {
    pub host: String,
    pub port: u16,
    pub remaining: Duration,
}

#[derive(Debug, Default)]
pub struct BadPeerLedger {
    entries: HashMap<PeerId, BadPeerEntry>,
}

impl BadPeerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `penalty` to whatever remains on `id`'s current penalty and restarts
    /// the window. Returns the new penalty length.
    pub fn warn(&mut self, id: &PeerId, penalty: Duration) -> Duration {
        self.warn_at(id, penalty, Instant::now())
    }

    pub(crate) fn warn_at(&mut self, id: &PeerId, penalty: Duration, now: Instant) -> Duration {
        let total = match self.entries.get_mut(id) {
            Some(entry) => {
                let total = entry.remaining_at(now).saturating_add(penalty);
                entry.penalty = total;
                entry.since = now;
                total
            }
            None => {
                self.entries.insert(
                    id.clone(),
                    BadPeerEntry {
                        host: id.host().to_string(),
                        port: id.port(),
                        since: now,
                        penalty,
                    },
                );
                penalty
            }
        };
        debug!(%id, penalty_secs = total.as_secs(), "peer penalized");
        total
    }

    /// Whether `id` is currently refused admission. Purges an expired entry.
    pub fn is_penalized(&mut self, id: &PeerId) -> bool {
        self.is_penalized_at(id, Instant::now())
    }

    pub(crate) fn is_penalized_at(&mut self, id: &PeerId, now: Instant) -> bool {
        let Some(entry) = self.entries.get(id) else {
            return false;
        };
        if entry.is_expired_at(now) {
            trace!(%id, "penalty expired");
            self.entries.remove(id);
            return false;
        }
        true
    }

    /// Remaining penalty without purging.
    pub fn remaining(&self, id: &PeerId) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(id)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.remaining_at(now))
    }

    pub fn get(&self, id: &PeerId) -> Option<&BadPeerEntry> {
        self.entries.get(id)
    }

    /// Entries still in effect.
    pub fn snapshot(&self) -> Vec<BadPeerSnapshot> {
        let now = Instant::now();
        let mut snapshot: Vec<_> = self
            .entries
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| BadPeerSnapshot {
                host: entry.host.clone(),
                port: entry.port,
                remaining: entry.remaining_at(now),
            })
            .collect();
        snapshot.sort_by(|a, b| (&a.host, a.port).cmp(&(&b.host, b.port)));
        snapshot
    }

    /// Number of recorded entries, including expired ones not yet looked up.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
