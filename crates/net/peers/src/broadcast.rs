//! Broadcast selector: send to a random subset of matching live peers.

use bytes::Bytes;
use rand::Rng;
use rand::seq::SliceRandom;
use tlsp2p_net_peer::{PeerHandle, PeerId, Transport};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::PoolError;
use crate::manager::PeerPool;

/// How many matching peers receive a send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Fanout {
    #[default]
    All,
    Count(usize),
}

impl Fanout {
    /// Zero or negative means every matching peer.
    pub fn from_signed(count: i64) -> Self {
        match usize::try_from(count) {
            Ok(0) | Err(_) => Self::All,
            Ok(n) => Self::Count(n),
        }
    }

    /// `Count(0)` is treated like `All`, as in [`Fanout::from_signed`].
    fn limit(&self, matched: usize) -> usize {
        match self {
            Self::All | Self::Count(0) => matched,
            Self::Count(n) => (*n).min(matched),
        }
    }
}

/// Matches peers whose `property` is one of `values`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerFilter {
    pub property: String,
    pub values: Vec<String>,
}

impl PeerFilter {
    pub fn new<I, V>(property: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            property: property.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Peers whose handshake has completed.
    pub fn connected() -> Self {
        Self::new("state", ["connected"])
    }

    pub fn matches<P: PeerHandle + ?Sized>(&self, peer: &P) -> bool {
        peer.property(&self.property)
            .is_some_and(|value| self.values.contains(&value))
    }
}

/// A reply received from one recipient of a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerReply {
    pub peer: PeerId,
    pub command: String,
    pub payload: Bytes,
}

/// Forwards the first `command` message from each recipient to `tx`.
///
/// A route is dropped after it fires once, or when its peer leaves the live set.
#[derive(Debug, Clone)]
pub struct ReplyRoute {
    pub command: String,
    pub tx: mpsc::UnboundedSender<PeerReply>,
}

impl ReplyRoute {
    pub fn new(command: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<PeerReply>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                command: command.into(),
                tx,
            },
            rx,
        )
    }
}

/// A single broadcast.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub fanout: Fanout,
    pub filter: PeerFilter,
    pub command: String,
    pub payload: Bytes,
    pub reply: Option<ReplyRoute>,
}

impl SendRequest {
    pub fn new(filter: PeerFilter, command: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            fanout: Fanout::All,
            filter,
            command: command.into(),
            payload: payload.into(),
            reply: None,
        }
    }

    pub fn fanout(mut self, fanout: Fanout) -> Self {
        self.fanout = fanout;
        self
    }

    pub fn reply(mut self, route: ReplyRoute) -> Self {
        self.reply = Some(route);
        self
    }
}

/// Shuffles `matched` in place (Fisher-Yates) and keeps the first `fanout` entries.
pub(crate) fn select_recipients<R: Rng + ?Sized>(
    mut matched: Vec<PeerId>,
    fanout: Fanout,
    rng: &mut R,
) -> Vec<PeerId> {
    let limit = fanout.limit(matched.len());
    matched.shuffle(rng);
    matched.truncate(limit);
    matched
}

impl<T: Transport> PeerPool<T> {
    /// Sends `request.command` to a random subset of live peers matching the filter.
    ///
    /// Returns the recipients, or [`PoolError::NoRecipients`] when nothing matched.
    pub fn send(&mut self, request: SendRequest) -> Result<Vec<PeerId>, PoolError> {
        self.send_with_rng(request, &mut rand::rng())
    }

    pub(crate) fn send_with_rng<R: Rng + ?Sized>(
        &mut self,
        request: SendRequest,
        rng: &mut R,
    ) -> Result<Vec<PeerId>, PoolError> {
        let SendRequest {
            fanout,
            filter,
            command,
            payload,
            reply,
        } = request;

        let mut matched: Vec<PeerId> = self
            .live
            .iter()
            .filter(|(_, entry)| filter.matches(&entry.peer))
            .map(|(id, _)| id.clone())
            .collect();
        if matched.is_empty() {
            debug!(property = %filter.property, "no live peer matched send filter");
            return Err(PoolError::NoRecipients);
        }
        // Map iteration order is not stable; start the shuffle from a known order.
        matched.sort();

        let recipients = select_recipients(matched, fanout, rng);
        for id in &recipients {
            let Some(entry) = self.live.get_mut(id) else {
                continue;
            };
            trace!(%id, %command, "sending");
            entry.peer.send(&command, payload.clone());
            if let Some(route) = &reply {
                entry.replies.push(route.clone());
            }
        }
        Ok(recipients)
    }
}
