//! Pool notifications and non-blocking broadcast emitter.

use std::borrow::Cow;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use tlsp2p_net_peer::PeerId;
use tokio::sync::broadcast;

use crate::ledger::BadPeerSnapshot;
use crate::state::PoolState;

/// Severity of an `error` notification, in increasing order.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Notice,
    #[default]
    Warning,
    Error,
}

/// Payload of the `status` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    pub num_active: usize,
    pub pool_size: usize,
    pub bad_peers: Vec<BadPeerSnapshot>,
}

/// Notifications observable by the pool owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    StateChange {
        old: PoolState,
        new: PoolState,
    },
    Error {
        severity: Severity,
        message: String,
    },
    Status(PoolStatus),
    PeerConnect {
        peer: PeerId,
    },
    PeerEnd {
        peer: PeerId,
    },
    PeerError {
        peer: PeerId,
        error: String,
    },
    ListenConnect {
        peer: PeerId,
    },
    Message {
        peer: PeerId,
        command: String,
        payload: Bytes,
    },
    /// Re-emission of [`PoolEvent::Message`] keyed by the protocol command.
    CommandMessage {
        peer: PeerId,
        command: String,
        payload: Bytes,
    },
}

impl PoolEvent {
    /// Notification name: `stateChange`, `error`, ..., or `<command>Message`.
    pub fn name(&self) -> Cow<'static, str> {
        match self {
            Self::StateChange { .. } => Cow::Borrowed("stateChange"),
            Self::Error { .. } => Cow::Borrowed("error"),
            Self::Status(_) => Cow::Borrowed("status"),
            Self::PeerConnect { .. } => Cow::Borrowed("peerConnect"),
            Self::PeerEnd { .. } => Cow::Borrowed("peerEnd"),
            Self::PeerError { .. } => Cow::Borrowed("peerError"),
            Self::ListenConnect { .. } => Cow::Borrowed("listenConnect"),
            Self::Message { .. } => Cow::Borrowed("message"),
            Self::CommandMessage { command, .. } => Cow::Owned(format!("{command}Message")),
        }
    }

    pub fn peer(&self) -> Option<&PeerId> {
        match self {
            Self::PeerConnect { peer }
            | Self::PeerEnd { peer }
            | Self::PeerError { peer, .. }
            | Self::ListenConnect { peer }
            | Self::Message { peer, .. }
            | Self::CommandMessage { peer, .. } => Some(peer),
            Self::StateChange { .. } | Self::Error { .. } | Self::Status(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Non-blocking broadcast emitter. Slow subscribers drop events independently.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<PoolEvent>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: PoolEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventEmitter {
    pub fn state_changed(&self, old: PoolState, new: PoolState) {
        self.emit(PoolEvent::StateChange { old, new });
    }

    /// Emits an `error` notification and mirrors it to the log.
    pub fn report(&self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Info | Severity::Notice => tracing::info!(%severity, "{message}"),
            Severity::Warning => tracing::warn!(%severity, "{message}"),
            Severity::Error => tracing::error!(%severity, "{message}"),
        }
        self.emit(PoolEvent::Error { severity, message });
    }

    /// Emits both `message` and `<command>Message`.
    pub fn message(&self, peer: PeerId, command: String, payload: Bytes) {
        self.emit(PoolEvent::Message {
            peer: peer.clone(),
            command: command.clone(),
            payload: payload.clone(),
        });
        self.emit(PoolEvent::CommandMessage {
            peer,
            command,
            payload,
        });
    }
}
