use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::entry::EntryKey;

/// Opaque handle to a live unit in the world. The factory hands these out;
/// the core never inspects the value beyond equality.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode, Serialize, Deserialize,
)]
pub struct UnitHandle(pub u64);

impl std::fmt::Display for UnitHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A live spawned unit tracked by its owning controller. Created on spawn,
/// removed on death notification (when it moves into the respawn queue) or
/// by the stale-handle sweep.
#[derive(Clone, Debug)]
pub struct ActiveUnit {
    pub handle: UnitHandle,
    pub key: EntryKey,
    /// Tick at which the unit was created.
    pub spawned_tick: u64,
}
