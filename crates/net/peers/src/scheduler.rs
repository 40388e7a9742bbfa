//! Single-threaded work queue: deferred tasks plus cancellable timers.
//!
//! Deferred tasks run after the current operation returns, before any timer or
//! transport input. Timers fire in deadline order; ties keep scheduling order.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use tlsp2p_net_peer::{HandleId, PeerId};
use tokio::time::Instant;

/// Upper bound on a timer delay, roughly 30 years.
pub(crate) const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Work deferred to the next turn of the pool loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Task {
    /// Start the handshake of a freshly registered outbound handle.
    Connect { id: PeerId, handle: HandleId },
    /// Run a health check out of band.
    CheckPeers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Timer {
    /// Connect attempt window elapsed.
    ConnectTimeout { id: PeerId, handle: HandleId },
    /// Graceful close window elapsed.
    CloseFallback { id: PeerId, handle: HandleId },
    HealthCheck,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct TimerId(u64);

#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    tasks: VecDeque<Task>,
    timers: BTreeMap<(Instant, TimerId), Timer>,
    deadlines: HashMap<TimerId, Instant>,
    next_timer: u64,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn defer(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    pub(crate) fn next_task(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    /// Arms `timer` after `delay`. Delays past the clock's range are clamped to
    /// [`FAR_FUTURE`].
    pub(crate) fn schedule(&mut self, delay: Duration, timer: Timer) -> TimerId {
        self.schedule_at(Instant::now() + delay.min(FAR_FUTURE), timer)
    }

    pub(crate) fn schedule_at(&mut self, deadline: Instant, timer: Timer) -> TimerId {
        let id = TimerId(self.next_timer);
        self.next_timer = self.next_timer.wrapping_add(1);
        self.timers.insert((deadline, id), timer);
        self.deadlines.insert(id, deadline);
        id
    }

    /// Returns whether the timer was still pending.
    pub(crate) fn cancel(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id) {
            Some(deadline) => self.timers.remove(&(deadline, id)).is_some(),
            None => false,
        }
    }

    /// Removes and returns the earliest timer due at `now`.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<Timer> {
        let (&(deadline, id), _) = self.timers.first_key_value()?;
        if deadline > now {
            return None;
        }
        self.deadlines.remove(&id);
        self.timers.remove(&(deadline, id))
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.timers.first_key_value().map(|(&(deadline, _), _)| deadline)
    }

    #[cfg(test)]
    pub(crate) fn has_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }

    pub(crate) fn pending_timers(&self) -> usize {
        self.timers.len()
    }
}
