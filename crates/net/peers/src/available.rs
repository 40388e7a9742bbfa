//! Available pool: known but unconnected candidates in arrival order.

use hashlink::LinkedHashMap;
use tlsp2p_net_peer::{PeerId, Target};

/// FIFO of candidates, unique by identity. A repeated identity keeps its first
/// position and its first target.
#[derive(Debug)]
pub struct AvailablePool<S> {
    entries: LinkedHashMap<PeerId, Target<S>>,
}

impl<S> Default for AvailablePool<S> {
    fn default() -> Self {
        Self {
            entries: LinkedHashMap::new(),
        }
    }
}

impl<S> AvailablePool<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `target` unless its identity is already queued. Returns whether it was added.
    pub fn push(&mut self, target: Target<S>) -> bool {
        if self.entries.contains_key(&target.id) {
            return false;
        }
        self.entries.insert(target.id.clone(), target);
        true
    }

    /// Oldest candidate.
    pub fn pop_front(&mut self) -> Option<Target<S>> {
        self.entries.pop_front().map(|(_, target)| target)
    }

    pub fn remove(&mut self, id: &PeerId) -> Option<Target<S>> {
        self.entries.remove(id)
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identities in queue order.
    pub fn ids(&self) -> impl Iterator<Item = &PeerId> {
        self.entries.keys()
    }
}
