//! Standalone collaborator implementations used by the `spawnd` binary.
//!
//! A real deployment wires the engine's own world, factory and display
//! into the registry; these implementations let the service run (and be
//! driven from the console) without an engine attached.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use chrono::Timelike;

use spawnkeep_core::constants::TICKS;
use spawnkeep_core::traits::{
    DifficultyDelay, DisplayService, EntityFactory, SpawnDenied, WorldQuery,
};
use spawnkeep_core::types::{BlockPos, EntryKey, SpawnerId, UnitHandle, Weather};

/// Book of live handles shared between the standalone world and factory.
/// Single-threaded by design: everything lives on the tick thread.
#[derive(Debug, Default)]
pub struct UnitLedger {
    next: u64,
    live: HashSet<UnitHandle>,
}

impl UnitLedger {
    pub fn allocate(&mut self) -> UnitHandle {
        self.next += 1;
        let handle = UnitHandle(self.next);
        let _ = self.live.insert(handle);
        handle
    }

    pub fn contains(&self, handle: UnitHandle) -> bool {
        self.live.contains(&handle)
    }

    /// Remove a handle from the ledger. Returns whether it was live.
    pub fn remove(&mut self, handle: UnitHandle) -> bool {
        self.live.remove(&handle)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

pub type SharedLedger = Rc<RefCell<UnitLedger>>;

pub fn new_ledger() -> SharedLedger {
    Rc::new(RefCell::new(UnitLedger::default()))
}

/// World stub for console operation: regions are always loaded, an
/// observer is always in range, weather is clear, and the hour tracks the
/// host wall clock.
pub struct StandaloneWorld {
    ledger: SharedLedger,
}

impl StandaloneWorld {
    pub fn new(ledger: SharedLedger) -> Self {
        Self { ledger }
    }
}

impl WorldQuery for StandaloneWorld {
    fn is_region_loaded(&self, _pos: &BlockPos) -> bool {
        true
    }

    fn is_observer_nearby(&self, _pos: &BlockPos, _radius: f64) -> bool {
        true
    }

    fn current_hour(&self, _world: &str) -> u8 {
        chrono::Local::now().hour() as u8
    }

    fn current_weather(&self, _world: &str) -> Weather {
        Weather::Clear
    }

    fn is_unit_valid(&self, handle: UnitHandle) -> bool {
        self.ledger.borrow().contains(handle)
    }

    fn is_solid(&self, _pos: &BlockPos) -> bool {
        false
    }
}

/// Factory stub: hands out sequential handles from the shared ledger.
pub struct StandaloneFactory {
    ledger: SharedLedger,
}

impl StandaloneFactory {
    pub fn new(ledger: SharedLedger) -> Self {
        Self { ledger }
    }
}

impl EntityFactory for StandaloneFactory {
    fn spawn(&mut self, at: &BlockPos, key: &EntryKey) -> Result<UnitHandle, SpawnDenied> {
        let handle = self.ledger.borrow_mut().allocate();
        log::info!("spawned {} as {} at {}", key, handle, at);
        Ok(handle)
    }
}

/// Display stub: labels go to the debug log instead of a renderer.
pub struct LogDisplay;

impl DisplayService for LogDisplay {
    fn upsert_label(&mut self, id: &SpawnerId, _pos: &BlockPos, lines: &[String]) {
        log::debug!("label {}: {}", id, lines.join(" | "));
    }

    fn remove_label(&mut self, id: &SpawnerId) {
        log::debug!("label {} removed", id);
    }
}

/// Delay policy scaling with tier, doubled for elites. The global cooldown
/// always consents; deployments with a shared cooldown ledger plug in
/// their own authority.
pub struct TieredDelays;

impl DifficultyDelay for TieredDelays {
    fn respawn_delay(&self, tier: u8, elite: bool) -> u64 {
        let secs = 5 + 5 * tier as u64;
        let ticks = secs * TICKS as u64;
        if elite {
            ticks * 2
        } else {
            ticks
        }
    }

    fn can_respawn_now(&self, _key: &EntryKey, _now_tick: u64) -> bool {
        true
    }
}
