//! Spawn registry - process-wide directory of population controllers.
//!
//! Owns the authoritative id -> controller map, the block-position index,
//! the unit ownership index used to route death notifications, the derived
//! group index and the template catalog. The registry tick is the single
//! mutation context for every controller.

use std::collections::HashMap;

use spawnkeep_core::codec;
use spawnkeep_core::constants::{GROUP_REBUILD_INTERVAL_TICKS, SWEEP_INTERVAL_TICKS};
use spawnkeep_core::species::SpeciesCatalog;
use spawnkeep_core::traits::{DifficultyDelay, DisplayService, EntityFactory, WorldQuery};
use spawnkeep_core::types::{
    BlockPos, ControllerProperties, DisplayMode, PopulationEntry, SpawnerId, UnitHandle,
};

use crate::controller::{Defaults, PopulationController};
use crate::snapshot::ControllerSnapshot;

/// Named default population strings. A template instantiates a controller
/// without walking an operator through manual entry construction.
pub const TEMPLATES: &[(&str, &str)] = &[
    ("graveyard", "zombie:1@false#6,skeleton:1@false#4,witch:3@false#1"),
    ("undead_patrol", "zombie:2@false#4,skeleton:2@false#2"),
    ("spider_nest", "spider:2@false#5,cave_spider:3@false#3"),
    ("drowned_shore", "drowned:2@false#5,zombie:1@false#2"),
    ("nether_watch", "blaze:4@false#3,wither_skeleton:5@true#1"),
    ("raid_camp", "pillager:4@false#4,vindicator:5@false#2,ravager:6@true#1"),
];

pub fn template(name: &str) -> Option<&'static str> {
    TEMPLATES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, data)| *data)
}

pub struct SpawnRegistry {
    controllers: HashMap<SpawnerId, PopulationController>,
    by_pos: HashMap<BlockPos, SpawnerId>,
    /// Explicit ownership index: which controller is responsible for a
    /// live handle. Death notifications route through this.
    unit_owner: HashMap<UnitHandle, SpawnerId>,
    /// Derived from each controller's own group property; rebuilt
    /// periodically, never authoritative.
    groups: HashMap<String, Vec<SpawnerId>>,
    defaults: Defaults,
}

impl SpawnRegistry {
    pub fn new(defaults: Defaults) -> Self {
        Self {
            controllers: HashMap::new(),
            by_pos: HashMap::new(),
            unit_owner: HashMap::new(),
            groups: HashMap::new(),
            defaults,
        }
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub fn ids(&self) -> Vec<SpawnerId> {
        self.controllers.keys().cloned().collect()
    }

    pub fn get(&self, id: &SpawnerId) -> Option<&PopulationController> {
        self.controllers.get(id)
    }

    pub fn get_mut(&mut self, id: &SpawnerId) -> Option<&mut PopulationController> {
        self.controllers.get_mut(id)
    }

    pub fn controller_at(&self, pos: &BlockPos) -> Option<&PopulationController> {
        self.by_pos.get(pos).and_then(|id| self.controllers.get(id))
    }

    pub fn controller_at_mut(&mut self, pos: &BlockPos) -> Option<&mut PopulationController> {
        match self.by_pos.get(pos) {
            Some(id) => self.controllers.get_mut(id),
            None => None,
        }
    }

    pub fn owner_of(&self, handle: UnitHandle) -> Option<&SpawnerId> {
        self.unit_owner.get(&handle)
    }

    /// Install a controller at `anchor`, or reconfigure the one already
    /// there. Reconfiguration keeps live units and metrics; pending
    /// respawns for dropped entry keys die off lazily.
    pub fn create_or_update(
        &mut self,
        anchor: BlockPos,
        entries: Vec<PopulationEntry>,
        props: ControllerProperties,
        visible: bool,
        display_mode: DisplayMode,
    ) -> SpawnerId {
        if let Some(existing) = self.controller_at_mut(&anchor) {
            existing.set_entries(entries);
            existing.set_properties(props);
            let id = existing.id().clone();
            log::info!("reconfigured spawner {}", id);
            return id;
        }
        let controller =
            PopulationController::restore(anchor.clone(), entries, props, visible, display_mode);
        let id = controller.id().clone();
        let _ = self.by_pos.insert(anchor, id.clone());
        let _ = self.controllers.insert(id.clone(), controller);
        log::info!("created spawner {}", id);
        id
    }

    /// Instantiate a controller from a named template.
    pub fn create_from_template(
        &mut self,
        anchor: BlockPos,
        name: &str,
        catalog: &dyn SpeciesCatalog,
    ) -> Result<SpawnerId, String> {
        let data = template(name).ok_or_else(|| format!("unknown template '{name}'"))?;
        let out = codec::parse_population(data, catalog);
        if !out.is_clean() || out.entries.is_empty() {
            return Err(format!("template '{name}' did not parse cleanly"));
        }
        Ok(self.create_or_update(
            anchor,
            out.entries,
            ControllerProperties::default(),
            true,
            DisplayMode::default(),
        ))
    }

    /// Remove a controller, its unit ownership entries and its label.
    pub fn remove(&mut self, id: &SpawnerId, display: &mut dyn DisplayService) -> bool {
        let Some(controller) = self.controllers.remove(id) else {
            return false;
        };
        let _ = self.by_pos.remove(controller.anchor());
        self.unit_owner.retain(|_, owner| owner != id);
        display.remove_label(id);
        log::info!("removed spawner {}", id);
        true
    }

    /// Route a death notification to the owning controller. Unknown
    /// handles (already swept, or owner since removed) are a no-op.
    pub fn on_unit_died(&mut self, handle: UnitHandle, delays: &dyn DifficultyDelay, now: u64) -> bool {
        let Some(id) = self.unit_owner.remove(&handle) else {
            log::debug!("death notification for untracked unit {}", handle);
            return false;
        };
        match self.controllers.get_mut(&id) {
            Some(controller) => controller.on_unit_removed(handle, delays, now),
            None => false,
        }
    }

    /// One scheduling cycle over every controller. Per controller: attempt
    /// the earliest due respawn, then - only when no respawns remain
    /// outstanding - top up via `spawn_missing`, so the initial-fill path
    /// never races the respawn path. Controllers are processed
    /// independently; one controller's failure (logged inside the
    /// controller) never stops the cycle.
    pub fn tick(
        &mut self,
        now: u64,
        world: &dyn WorldQuery,
        factory: &mut dyn EntityFactory,
        delays: &dyn DifficultyDelay,
        display: &mut dyn DisplayService,
    ) -> usize {
        let mut spawned_this_cycle = 0;
        let defaults = self.defaults;

        for id in self.ids() {
            let Some(controller) = self.controllers.get_mut(&id) else {
                continue;
            };
            let mut changed = false;

            if let Some(handle) =
                controller.try_respawn_due(world, factory, delays, &defaults, now)
            {
                let _ = self.unit_owner.insert(handle, id.clone());
                spawned_this_cycle += 1;
                changed = true;
            }

            if !controller.has_pending() {
                let newly = controller.spawn_missing(world, factory, &defaults, now);
                changed |= !newly.is_empty();
                spawned_this_cycle += newly.len();
                for handle in newly {
                    let _ = self.unit_owner.insert(handle, id.clone());
                }
            }

            if changed {
                controller.refresh_label(display);
            }
        }

        if now % SWEEP_INTERVAL_TICKS == 0 {
            self.sweep_stale(world);
        }
        if now % GROUP_REBUILD_INTERVAL_TICKS == 0 {
            self.rebuild_groups();
        }

        spawned_this_cycle
    }

    /// Drop tracked units whose handle no longer resolves in the world.
    pub fn sweep_stale(&mut self, world: &dyn WorldQuery) {
        let mut dropped = 0;
        for controller in self.controllers.values_mut() {
            for handle in controller.sweep_stale(world) {
                let _ = self.unit_owner.remove(&handle);
                dropped += 1;
            }
        }
        if dropped > 0 {
            log::info!("stale sweep dropped {} unit handles", dropped);
        }
    }

    /// Rebuild the group index from controller properties.
    pub fn rebuild_groups(&mut self) {
        self.groups.clear();
        for (id, controller) in &self.controllers {
            if let Some(group) = controller.group() {
                self.groups
                    .entry(group.to_string())
                    .or_default()
                    .push(id.clone());
            }
        }
        for members in self.groups.values_mut() {
            members.sort();
        }
    }

    pub fn group_members(&self, group: &str) -> &[SpawnerId] {
        self.groups.get(group).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn group_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.groups.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Controllers within `radius` blocks of `pos`, same world only.
    pub fn near(&self, pos: &BlockPos, radius: f64) -> Vec<&PopulationController> {
        let radius_sq = radius * radius;
        let mut found: Vec<&PopulationController> = self
            .controllers
            .values()
            .filter(|c| c.anchor().world == pos.world && c.anchor().distance_sq(pos) <= radius_sq)
            .collect();
        found.sort_by(|a, b| a.id().cmp(b.id()));
        found
    }

    pub fn total_live(&self) -> usize {
        self.controllers.values().map(|c| c.live_count()).sum()
    }

    pub fn total_pending(&self) -> usize {
        self.controllers.values().map(|c| c.pending_count()).sum()
    }

    /// Install controllers from persisted snapshots. Records that fail
    /// validation are skipped with a diagnostic and never partially
    /// applied. Returns how many controllers were installed.
    pub fn load(&mut self, snapshots: Vec<ControllerSnapshot>, catalog: &dyn SpeciesCatalog) -> usize {
        let mut loaded = 0;
        for snap in snapshots {
            let Some(anchor) = BlockPos::from_storage_key(&snap.key) else {
                log::error!("skipping snapshot with bad key '{}'", snap.key);
                continue;
            };
            let out = codec::parse_population(&snap.data, catalog);
            if !out.is_clean() {
                log::warn!(
                    "snapshot {}: {} malformed entry token(s) skipped",
                    snap.key,
                    out.rejected.len()
                );
            }
            if out.entries.is_empty() {
                log::error!("skipping snapshot {}: no valid entries", snap.key);
                continue;
            }
            let mode = DisplayMode::from_u8(snap.display_mode).unwrap_or_default();
            let _ = self.create_or_update(anchor, out.entries, snap.props, snap.visible, mode);
            loaded += 1;
        }
        self.rebuild_groups();
        loaded
    }

    /// Capture every controller for persistence.
    pub fn snapshots(&self) -> Vec<ControllerSnapshot> {
        let mut snaps: Vec<ControllerSnapshot> = self
            .controllers
            .values()
            .map(ControllerSnapshot::capture)
            .collect();
        snaps.sort_by(|a, b| a.key.cmp(&b.key));
        snaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FixedDelays, NullDisplay, RecordingDisplay, TestFactory, TestWorld};
    use spawnkeep_core::codec::parse_population;
    use spawnkeep_core::species::StockCatalog;

    fn entries(data: &str) -> Vec<PopulationEntry> {
        let out = parse_population(data, &StockCatalog);
        assert!(out.is_clean());
        out.entries
    }

    fn registry() -> SpawnRegistry {
        SpawnRegistry::new(Defaults {
            capacity: 10,
            detection_radius: 32.0,
        })
    }

    #[test]
    fn create_indexes_by_position_and_id() {
        let mut reg = registry();
        let anchor = BlockPos::new("overworld", 5, 70, 5);
        let id = reg.create_or_update(
            anchor.clone(),
            entries("zombie:1@false#2"),
            ControllerProperties::default(),
            true,
            DisplayMode::Full,
        );
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.controller_at(&anchor).unwrap().id(), &id);
        assert_eq!(reg.get(&id).unwrap().anchor(), &anchor);
    }

    /// Creating again at the same block reconfigures instead of duplicating.
    #[test]
    fn create_at_same_block_updates() {
        let mut reg = registry();
        let anchor = BlockPos::new("overworld", 5, 70, 5);
        let first = reg.create_or_update(
            anchor.clone(),
            entries("zombie:1@false#2"),
            ControllerProperties::default(),
            true,
            DisplayMode::Full,
        );
        let second = reg.create_or_update(
            anchor.clone(),
            entries("skeleton:2@false#3"),
            ControllerProperties::default(),
            true,
            DisplayMode::Full,
        );
        assert_eq!(first, second);
        assert_eq!(reg.len(), 1);
        assert_eq!(
            reg.controller_at(&anchor).unwrap().entries()[0].species,
            "skeleton"
        );
    }

    /// Death notifications route through the ownership index to the right
    /// controller.
    #[test]
    fn death_routes_to_owning_controller() {
        let mut reg = registry();
        let world = TestWorld::new();
        let mut factory = TestFactory::new(world.ledger());
        let delays = FixedDelays::new(40);
        let mut display = NullDisplay;

        let a = reg.create_or_update(
            BlockPos::new("overworld", 0, 64, 0),
            entries("zombie:1@false#1"),
            ControllerProperties::default(),
            true,
            DisplayMode::Full,
        );
        let b = reg.create_or_update(
            BlockPos::new("overworld", 100, 64, 0),
            entries("skeleton:1@false#1"),
            ControllerProperties::default(),
            true,
            DisplayMode::Full,
        );

        assert_eq!(reg.tick(1, &world, &mut factory, &delays, &mut display), 2);
        let handle = reg.get(&a).unwrap().active_handles().next().unwrap();
        assert_eq!(reg.owner_of(handle), Some(&a));

        world.kill(handle);
        assert!(reg.on_unit_died(handle, &delays, 2));
        assert_eq!(reg.get(&a).unwrap().pending_count(), 1);
        assert_eq!(reg.get(&b).unwrap().pending_count(), 0);
        assert_eq!(reg.owner_of(handle), None);

        // A second notification for the same handle is a no-op.
        assert!(!reg.on_unit_died(handle, &delays, 3));
    }

    /// While a controller has pending respawns, the fill path is held off;
    /// the respawn path alone restores the population.
    #[test]
    fn fill_waits_for_pending_respawns() {
        let mut reg = registry();
        let world = TestWorld::new();
        let mut factory = TestFactory::new(world.ledger());
        let delays = FixedDelays::new(100);
        let mut display = NullDisplay;

        let id = reg.create_or_update(
            BlockPos::new("overworld", 0, 64, 0),
            entries("zombie:1@false#3"),
            ControllerProperties::default(),
            true,
            DisplayMode::Full,
        );
        assert_eq!(reg.tick(1, &world, &mut factory, &delays, &mut display), 3);

        let handle = reg.get(&id).unwrap().active_handles().next().unwrap();
        world.kill(handle);
        reg.on_unit_died(handle, &delays, 2);

        // Delay not elapsed: neither path may spawn, even though live (2)
        // is below desired (3).
        for now in 3..100 {
            assert_eq!(reg.tick(now, &world, &mut factory, &delays, &mut display), 0);
        }
        assert_eq!(reg.get(&id).unwrap().live_count(), 2);

        // Delay elapsed: exactly one respawn, and live returns to 3.
        assert_eq!(reg.tick(102, &world, &mut factory, &delays, &mut display), 1);
        assert_eq!(reg.get(&id).unwrap().live_count(), 3);
        assert_eq!(reg.get(&id).unwrap().pending_count(), 0);
    }

    #[test]
    fn remove_clears_all_indices() {
        let mut reg = registry();
        let world = TestWorld::new();
        let mut factory = TestFactory::new(world.ledger());
        let delays = FixedDelays::new(40);
        let mut display = RecordingDisplay::default();

        let anchor = BlockPos::new("overworld", 0, 64, 0);
        let id = reg.create_or_update(
            anchor.clone(),
            entries("zombie:1@false#2"),
            ControllerProperties::default(),
            true,
            DisplayMode::Full,
        );
        reg.tick(1, &world, &mut factory, &delays, &mut display);
        let handle = reg.get(&id).unwrap().active_handles().next().unwrap();

        assert!(reg.remove(&id, &mut display));
        assert!(reg.is_empty());
        assert_eq!(reg.controller_at(&anchor).map(|c| c.id().clone()), None);
        assert_eq!(reg.owner_of(handle), None);
        assert!(!reg.remove(&id, &mut display));
    }

    /// The stale sweep drops unresolvable handles and unindexes them.
    #[test]
    fn sweep_unindexes_stale_units() {
        let mut reg = registry();
        let world = TestWorld::new();
        let mut factory = TestFactory::new(world.ledger());
        let delays = FixedDelays::new(40);
        let mut display = NullDisplay;

        let id = reg.create_or_update(
            BlockPos::new("overworld", 0, 64, 0),
            entries("zombie:1@false#2"),
            ControllerProperties::default(),
            true,
            DisplayMode::Full,
        );
        reg.tick(1, &world, &mut factory, &delays, &mut display);
        let handle = reg.get(&id).unwrap().active_handles().next().unwrap();
        world.forget(handle);

        reg.sweep_stale(&world);
        assert_eq!(reg.owner_of(handle), None);
        assert_eq!(reg.get(&id).unwrap().live_count(), 1);
    }

    #[test]
    fn groups_rebuild_from_properties() {
        let mut reg = registry();
        let mut props = ControllerProperties::default();
        props.group = Some("crypt".into());
        let a = reg.create_or_update(
            BlockPos::new("overworld", 0, 64, 0),
            entries("zombie:1@false#1"),
            props.clone(),
            true,
            DisplayMode::Full,
        );
        let b = reg.create_or_update(
            BlockPos::new("overworld", 8, 64, 0),
            entries("skeleton:1@false#1"),
            props,
            true,
            DisplayMode::Full,
        );
        let _ = reg.create_or_update(
            BlockPos::new("overworld", 16, 64, 0),
            entries("spider:1@false#1"),
            ControllerProperties::default(),
            true,
            DisplayMode::Full,
        );

        reg.rebuild_groups();
        let members = reg.group_members("crypt");
        assert_eq!(members.len(), 2);
        assert!(members.contains(&a) && members.contains(&b));
        assert!(reg.group_members("nowhere").is_empty());
    }

    #[test]
    fn near_filters_by_world_and_distance() {
        let mut reg = registry();
        let a = reg.create_or_update(
            BlockPos::new("overworld", 0, 64, 0),
            entries("zombie:1@false#1"),
            ControllerProperties::default(),
            true,
            DisplayMode::Full,
        );
        let _far = reg.create_or_update(
            BlockPos::new("overworld", 500, 64, 0),
            entries("zombie:1@false#1"),
            ControllerProperties::default(),
            true,
            DisplayMode::Full,
        );
        let _other_world = reg.create_or_update(
            BlockPos::new("nether", 4, 64, 0),
            entries("blaze:4@false#1"),
            ControllerProperties::default(),
            true,
            DisplayMode::Full,
        );

        let near = reg.near(&BlockPos::new("overworld", 2, 64, 0), 16.0);
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].id(), &a);
    }

    #[test]
    fn template_instantiates_controller() {
        let mut reg = registry();
        let id = reg
            .create_from_template(
                BlockPos::new("overworld", 0, 64, 0),
                "undead_patrol",
                &StockCatalog,
            )
            .unwrap();
        let ctrl = reg.get(&id).unwrap();
        assert_eq!(ctrl.desired_total(), 6);
        assert!(reg
            .create_from_template(BlockPos::new("overworld", 9, 64, 0), "bogus", &StockCatalog)
            .is_err());
    }

    /// Every shipped template parses cleanly against the stock catalog.
    #[test]
    fn all_templates_are_valid() {
        for (name, data) in TEMPLATES {
            let out = parse_population(data, &StockCatalog);
            assert!(out.is_clean(), "template {name} failed to parse");
            assert!(!out.entries.is_empty(), "template {name} is empty");
            assert!(
                spawnkeep_core::codec::validate(&out.entries, &StockCatalog).is_ok(),
                "template {name} failed validation"
            );
        }
    }

    /// Snapshot capture and reload land on an equivalent registry.
    #[test]
    fn snapshot_round_trip() {
        let mut reg = registry();
        let mut props = ControllerProperties::default();
        props.group = Some("crypt".into());
        props.capacity_override = Some(7);
        let _ = reg.create_or_update(
            BlockPos::new("overworld", 3, 70, -9),
            entries("zombie:2@false#4,witch:3@false#1"),
            props.clone(),
            false,
            DisplayMode::NameOnly,
        );

        let snaps = reg.snapshots();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].key, "overworld,3,70,-9");

        let mut fresh = registry();
        assert_eq!(fresh.load(snaps, &StockCatalog), 1);
        let restored = fresh
            .controller_at(&BlockPos::new("overworld", 3, 70, -9))
            .unwrap();
        assert_eq!(restored.props(), &props);
        assert!(!restored.visible());
        assert_eq!(restored.display_mode(), DisplayMode::NameOnly);
        assert_eq!(restored.desired_total(), 5);
        assert_eq!(fresh.group_members("crypt").len(), 1);
    }

    /// A snapshot whose data fails validation contributes nothing.
    #[test]
    fn load_skips_invalid_snapshots() {
        let mut reg = registry();
        let snaps = vec![
            ControllerSnapshot {
                key: "overworld,0,64,0".into(),
                data: "dragon:1@false#1".into(),
                visible: true,
                display_mode: 2,
                props: ControllerProperties::default(),
            },
            ControllerSnapshot {
                key: "not-a-key".into(),
                data: "zombie:1@false#1".into(),
                visible: true,
                display_mode: 2,
                props: ControllerProperties::default(),
            },
            ControllerSnapshot {
                key: "overworld,1,64,0".into(),
                data: "zombie:1@false#1".into(),
                visible: true,
                display_mode: 2,
                props: ControllerProperties::default(),
            },
        ];
        assert_eq!(reg.load(snaps, &StockCatalog), 1);
        assert_eq!(reg.len(), 1);
    }
}
