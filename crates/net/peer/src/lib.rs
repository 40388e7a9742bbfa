//! Peer-side building blocks for the connection pool.
//!
//! - [`id`] - `host~port` peer identity
//! - [`candidate`] - The accepted candidate address forms and their normalization
//! - [`handle`] - Peer handle contract and the events a handle raises
//! - [`transport`] - Seam between the pool and the encrypted wire layer

pub mod candidate;
pub mod handle;
pub mod id;
pub mod transport;

pub use candidate::{Candidate, CandidateError, RemoteAddr, Target};
pub use handle::{PeerConnState, PeerEvent, PeerHandle};
pub use id::{PeerId, PeerIdError};
pub use transport::{
    HandleId, InboundSink, Link, ListenError, PeerEventSink, PeerSpec, Transport, TransportInput,
};
