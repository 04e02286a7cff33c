//! Hand-built collaborator fakes shared by the unit tests.

use std::cell::Cell;
use std::collections::HashMap;

use spawnkeep_core::traits::{
    DifficultyDelay, DisplayService, EntityFactory, SpawnDenied, WorldQuery,
};
use spawnkeep_core::types::{BlockPos, EntryKey, SpawnerId, UnitHandle, Weather};

use crate::world::{new_ledger, SharedLedger};

/// Fully controllable world: every gate can be toggled per test.
pub struct TestWorld {
    ledger: SharedLedger,
    region_loaded: Cell<bool>,
    observer_nearby: Cell<bool>,
    hour: Cell<u8>,
    weather: Cell<Weather>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            ledger: new_ledger(),
            region_loaded: Cell::new(true),
            observer_nearby: Cell::new(true),
            hour: Cell::new(12),
            weather: Cell::new(Weather::Clear),
        }
    }

    pub fn ledger(&self) -> SharedLedger {
        self.ledger.clone()
    }

    /// The unit dies in the world; the death notification is the caller's
    /// job, mirroring how the engine reports kills.
    pub fn kill(&self, handle: UnitHandle) {
        let _ = self.ledger.borrow_mut().remove(handle);
    }

    /// The unit silently stops resolving, as after a chunk discard. Only
    /// the stale sweep will notice.
    pub fn forget(&self, handle: UnitHandle) {
        let _ = self.ledger.borrow_mut().remove(handle);
    }

    pub fn set_region_loaded(&self, loaded: bool) {
        self.region_loaded.set(loaded);
    }

    pub fn set_observer_nearby(&self, nearby: bool) {
        self.observer_nearby.set(nearby);
    }

    pub fn set_hour(&self, hour: u8) {
        self.hour.set(hour);
    }

    pub fn set_weather(&self, weather: Weather) {
        self.weather.set(weather);
    }
}

impl WorldQuery for TestWorld {
    fn is_region_loaded(&self, _pos: &BlockPos) -> bool {
        self.region_loaded.get()
    }

    fn is_observer_nearby(&self, _pos: &BlockPos, _radius: f64) -> bool {
        self.observer_nearby.get()
    }

    fn current_hour(&self, _world: &str) -> u8 {
        self.hour.get()
    }

    fn current_weather(&self, _world: &str) -> Weather {
        self.weather.get()
    }

    fn is_unit_valid(&self, handle: UnitHandle) -> bool {
        self.ledger.borrow().contains(handle)
    }

    fn is_solid(&self, _pos: &BlockPos) -> bool {
        false
    }
}

/// Factory allocating from the test world's ledger; can be told to fail.
pub struct TestFactory {
    ledger: SharedLedger,
    fail: bool,
}

impl TestFactory {
    pub fn new(ledger: SharedLedger) -> Self {
        Self {
            ledger,
            fail: false,
        }
    }

    pub fn set_failing(&mut self, fail: bool) {
        self.fail = fail;
    }
}

impl EntityFactory for TestFactory {
    fn spawn(&mut self, _at: &BlockPos, _key: &EntryKey) -> Result<UnitHandle, SpawnDenied> {
        if self.fail {
            return Err(SpawnDenied::WorldRejected("test factory refusing".into()));
        }
        Ok(self.ledger.borrow_mut().allocate())
    }
}

/// Constant delay policy with an optional global-cooldown denial window.
pub struct FixedDelays {
    delay: u64,
    deny_until: u64,
}

impl FixedDelays {
    pub fn new(delay: u64) -> Self {
        Self {
            delay,
            deny_until: 0,
        }
    }

    /// Deny all respawns until the given tick, simulating the global
    /// cooldown authority saying "not yet".
    pub fn deny_until(mut self, tick: u64) -> Self {
        self.deny_until = tick;
        self
    }
}

impl DifficultyDelay for FixedDelays {
    fn respawn_delay(&self, _tier: u8, _elite: bool) -> u64 {
        self.delay
    }

    fn can_respawn_now(&self, _key: &EntryKey, now_tick: u64) -> bool {
        now_tick >= self.deny_until
    }
}

/// Display that swallows everything.
pub struct NullDisplay;

impl DisplayService for NullDisplay {
    fn upsert_label(&mut self, _id: &SpawnerId, _pos: &BlockPos, _lines: &[String]) {}

    fn remove_label(&mut self, _id: &SpawnerId) {}
}

/// Display that records the last label per spawner.
#[derive(Default)]
pub struct RecordingDisplay {
    pub labels: HashMap<String, Vec<String>>,
    pub removals: usize,
}

impl DisplayService for RecordingDisplay {
    fn upsert_label(&mut self, id: &SpawnerId, _pos: &BlockPos, lines: &[String]) {
        let _ = self.labels.insert(id.to_string(), lines.to_vec());
    }

    fn remove_label(&mut self, id: &SpawnerId) {
        let _ = self.labels.remove(id.as_str());
        self.removals += 1;
    }
}
