//! Live set: the authoritative record of active and in-flight connections.

use std::collections::HashMap;

use tlsp2p_net_peer::{HandleId, PeerId};

use crate::broadcast::ReplyRoute;
use crate::scheduler::TimerId;

/// One live handle and the bookkeeping attached to it.
#[derive(Debug)]
pub(crate) struct LiveEntry<P> {
    pub(crate) handle: HandleId,
    pub(crate) peer: P,
    pub(crate) inbound: bool,
    pub(crate) connect_timer: Option<TimerId>,
    pub(crate) close_timer: Option<TimerId>,
    /// Pending one-shot reply routes registered by `send`.
    pub(crate) replies: Vec<ReplyRoute>,
}

impl<P> LiveEntry<P> {
    pub(crate) fn new(handle: HandleId, peer: P, inbound: bool) -> Self {
        Self {
            handle,
            peer,
            inbound,
            connect_timer: None,
            close_timer: None,
            replies: Vec::new(),
        }
    }
}

/// At most one handle per identity; the live count is the map size.
#[derive(Debug)]
pub(crate) struct LiveSet<P> {
    entries: HashMap<PeerId, LiveEntry<P>>,
}

impl<P> Default for LiveSet<P> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<P> LiveSet<P> {
    /// Inserts `entry` unless `id` is already live; a rejected entry is handed back.
    pub(crate) fn insert(&mut self, id: PeerId, entry: LiveEntry<P>) -> Result<(), LiveEntry<P>> {
        if self.entries.contains_key(&id) {
            return Err(entry);
        }
        self.entries.insert(id, entry);
        Ok(())
    }

    pub(crate) fn remove(&mut self, id: &PeerId) -> Option<LiveEntry<P>> {
        self.entries.remove(id)
    }

    pub(crate) fn get(&self, id: &PeerId) -> Option<&LiveEntry<P>> {
        self.entries.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &PeerId) -> Option<&mut LiveEntry<P>> {
        self.entries.get_mut(id)
    }

    /// Entry for `id` only if it still belongs to `handle`.
    pub(crate) fn current_mut(&mut self, id: &PeerId, handle: HandleId) -> Option<&mut LiveEntry<P>> {
        self.entries
            .get_mut(id)
            .filter(|entry| entry.handle == handle)
    }

    pub(crate) fn contains(&self, id: &PeerId) -> bool {
        self.entries.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn ids(&self) -> Vec<PeerId> {
        self.entries.keys().cloned().collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&PeerId, &LiveEntry<P>)> {
        self.entries.iter()
    }
}
