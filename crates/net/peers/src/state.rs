//! Pool lifecycle state.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Overall pool state: `new -> initiating -> running -> shutdown`.
///
/// `shutdown` is reachable from every state and is terminal.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PoolState {
    #[default]
    New,
    Initiating,
    Running,
    Shutdown,
}

impl PoolState {
    pub fn is_initiating(&self) -> bool {
        matches!(self, PoolState::Initiating)
    }

    pub fn is_new(&self) -> bool {
        matches!(self, PoolState::New)
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, PoolState::Shutdown)
    }

    /// Whether an assignment from `self` to `next` is allowed.
    ///
    /// Every state may be re-assigned to itself; nothing leaves `shutdown`.
    pub fn can_become(&self, next: PoolState) -> bool {
        !self.is_shutdown() || next.is_shutdown()
    }
}
