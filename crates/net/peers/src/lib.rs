//! Encrypted peer pool: keeps a bounded set of live connections alive,
//! replenishes it from a queue of candidates and penalizes misbehaving peers.
//!
//! [`PeerPool`] is a synchronous single-owner state machine driven by
//! [`PeerPool::process_ready`]; [`PoolService`] runs it on a tokio task.

mod available;
mod broadcast;
pub mod config;
mod error;
pub mod events;
mod health;
mod ledger;
mod listener;
mod live;
mod manager;
mod scheduler;
mod service;
mod state;

#[cfg(test)]
mod test_utils;

pub use available::AvailablePool;
pub use broadcast::{Fanout, PeerFilter, PeerReply, ReplyRoute, SendRequest};
pub use config::{ConfigError, PoolConfig};
pub use error::PoolError;
pub use events::{EventEmitter, PoolEvent, PoolStatus, Severity};
pub use health::{EvictIdlest, LivePeerInfo, OverflowPolicy, WarnOnly};
pub use ledger::{BadPeerLedger, BadPeerSnapshot};
pub use manager::{AddReport, PeerPool};
pub use service::{PoolHandle, PoolService};
pub use state::PoolState;
