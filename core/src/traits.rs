//! Collaborator contracts consumed by the scheduling core.
//!
//! The registry and controllers only ever talk to the live world through
//! these traits; the server binary wires in real implementations and the
//! tests wire in fakes.

use crate::types::{BlockPos, EntryKey, SpawnerId, UnitHandle, Weather};

/// Why a spawn attempt produced no unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpawnDenied {
    /// The world refused to create the entity (full chunk, invalid
    /// template, engine-side failure). Transient; retried next cycle.
    WorldRejected(String),
    /// The factory has no template for this species at all.
    UnknownSpecies(String),
}

impl std::fmt::Display for SpawnDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpawnDenied::WorldRejected(why) => write!(f, "world rejected spawn: {why}"),
            SpawnDenied::UnknownSpecies(species) => {
                write!(f, "no entity template for species '{species}'")
            }
        }
    }
}

/// Creates live units. Stat rolling for tier/elite happens behind this
/// boundary and is out of scope here.
pub trait EntityFactory {
    fn spawn(&mut self, at: &BlockPos, key: &EntryKey) -> Result<UnitHandle, SpawnDenied>;
}

/// Respawn-delay policy and the global cooldown authority, keyed by
/// difficulty. Independent of any per-controller timer.
pub trait DifficultyDelay {
    /// Delay in ticks before a removed unit's replacement becomes eligible.
    fn respawn_delay(&self, tier: u8, elite: bool) -> u64;

    /// Whether the global cooldown currently permits respawning this kind
    /// of unit. A `false` re-queues the pending respawn with backoff.
    fn can_respawn_now(&self, key: &EntryKey, now_tick: u64) -> bool;
}

/// Read-only questions the core asks about the live world.
pub trait WorldQuery {
    fn is_region_loaded(&self, pos: &BlockPos) -> bool;
    fn is_observer_nearby(&self, pos: &BlockPos, radius: f64) -> bool;
    /// Current in-world hour, 0..24.
    fn current_hour(&self, world: &str) -> u8;
    fn current_weather(&self, world: &str) -> Weather;
    /// Whether a previously issued handle still resolves to a live entity.
    fn is_unit_valid(&self, handle: UnitHandle) -> bool;
    fn is_solid(&self, pos: &BlockPos) -> bool;
}

/// Floating-label rendering. Best effort: implementations log failures and
/// never surface them to the caller.
pub trait DisplayService {
    fn upsert_label(&mut self, id: &SpawnerId, pos: &BlockPos, lines: &[String]);
    fn remove_label(&mut self, id: &SpawnerId);
}
