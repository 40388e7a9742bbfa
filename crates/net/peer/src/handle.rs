//! Peer handle contract.
//!
//! A handle is one encrypted connection owned by the wire layer. The pool only
//! drives it through [`PeerHandle`] and observes it through [`PeerEvent`]s.

use auto_impl::auto_impl;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use tokio::time::Instant;

use crate::id::PeerId;

/// Transport state of a single peer connection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PeerConnState {
    New,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    Closed,
}

impl PeerConnState {
    /// Already on its way out; a kill finalizes instead of hanging up first.
    pub fn is_closing(&self) -> bool {
        matches!(
            self,
            PeerConnState::Disconnecting | PeerConnState::Disconnected | PeerConnState::Closed
        )
    }
}

/// Events raised by a peer handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// Handshake complete.
    Connect,
    /// A framed protocol message.
    Message { command: String, payload: Bytes },
    /// The remote end hung up.
    End,
    /// Transport failure.
    Error(String),
    /// The connection is gone. Raised exactly once per handle, including after `destroy`.
    Close,
}

impl PeerEvent {
    pub fn message(command: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self::Message {
            command: command.into(),
            payload: payload.into(),
        }
    }
}

/// One network connection as seen by the pool.
#[auto_impl(&mut, Box)]
pub trait PeerHandle {
    fn id(&self) -> &PeerId;

    fn state(&self) -> PeerConnState;

    fn set_state(&mut self, state: PeerConnState);

    /// Last inbound activity. `None` means never, or connected too recently to judge.
    fn last_seen(&self) -> Option<Instant>;

    /// Starts the handshake, over the pre-established link if the handle has one.
    fn connect(&mut self);

    /// Requests a graceful close.
    fn disconnect(&mut self);

    /// Tears the connection down immediately. Must still raise [`PeerEvent::Close`].
    fn destroy(&mut self);

    fn send(&mut self, command: &str, payload: Bytes);

    /// Implementation-specific attributes, used by broadcast filters.
    fn attribute(&self, _name: &str) -> Option<String> {
        None
    }

    /// Named property lookup used by broadcast filters.
    fn property(&self, name: &str) -> Option<String> {
        match name {
            "id" => Some(self.id().to_string()),
            "host" => Some(self.id().host().to_string()),
            "port" => Some(self.id().port().to_string()),
            "state" => Some(self.state().to_string()),
            other => self.attribute(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub {
        id: PeerId,
        state: PeerConnState,
    }

    impl PeerHandle for Stub {
        fn id(&self) -> &PeerId {
            &self.id
        }

        fn state(&self) -> PeerConnState {
            self.state
        }

        fn set_state(&mut self, state: PeerConnState) {
            self.state = state;
        }

        fn last_seen(&self) -> Option<Instant> {
            None
        }

        fn connect(&mut self) {}

        fn disconnect(&mut self) {}

        fn destroy(&mut self) {}

        fn send(&mut self, _command: &str, _payload: Bytes) {}

        fn attribute(&self, name: &str) -> Option<String> {
            (name == "agent").then(|| "stub/1.0".to_string())
        }
    }

    #[test]
    fn test_closing_states() {
        assert!(!PeerConnState::New.is_closing());
        assert!(!PeerConnState::Connecting.is_closing());
        assert!(!PeerConnState::Connected.is_closing());
        assert!(PeerConnState::Disconnecting.is_closing());
        assert!(PeerConnState::Disconnected.is_closing());
        assert!(PeerConnState::Closed.is_closing());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(PeerConnState::Disconnecting.to_string(), "disconnecting");
        assert_eq!("connected".parse::<PeerConnState>().unwrap(), PeerConnState::Connected);
    }

    #[test]
    fn test_property_lookup() {
        let mut stub = Stub {
            id: PeerId::new("10.0.0.1", 8333),
            state: PeerConnState::New,
        };
        stub.set_state(PeerConnState::Connected);

        assert_eq!(stub.property("state").as_deref(), Some("connected"));
        assert_eq!(stub.property("host").as_deref(), Some("10.0.0.1"));
        assert_eq!(stub.property("port").as_deref(), Some("8333"));
        assert_eq!(stub.property("id").as_deref(), Some("10.0.0.1~8333"));
        assert_eq!(stub.property("agent").as_deref(), Some("stub/1.0"));
        assert_eq!(stub.property("missing"), None);
    }

    #[test]
    fn test_boxed_handle_forwards() {
        let mut boxed: Box<dyn PeerHandle> = Box::new(Stub {
            id: PeerId::new("10.0.0.2", 1),
            state: PeerConnState::New,
        });
        boxed.set_state(PeerConnState::Closed);
        assert_eq!(boxed.property("state").as_deref(), Some("closed"));
    }
}
