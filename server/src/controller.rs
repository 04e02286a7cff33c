//! Population controller - owns one location's entry list, active units,
//! respawn queue, metrics and display state.
//!
//! All mutation happens from the registry tick context; the controller
//! itself holds no locks and spawns no threads.

use std::collections::HashMap;

use rand::Rng;

use spawnkeep_core::codec;
use spawnkeep_core::constants::{
    MAX_CAPACITY, MAX_DETECTION_RADIUS, RESPAWN_RETRY_TICKS, VERTICAL_PROBE_STEPS,
};
use spawnkeep_core::traits::{DifficultyDelay, DisplayService, EntityFactory, SpawnDenied, WorldQuery};
use spawnkeep_core::types::{
    ActiveUnit, BlockPos, ControllerProperties, DisplayMode, EntryKey, PopulationEntry,
    SpawnRadius, SpawnerId, TimeRestriction, UnitHandle, WeatherRestriction,
};

use crate::respawn::RespawnQueue;

/// Registry-wide fallbacks applied when a controller has no override.
#[derive(Clone, Copy, Debug)]
pub struct Defaults {
    pub capacity: u16,
    pub detection_radius: f64,
}

/// Why a spawn cycle was skipped entirely.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateBlock {
    RegionUnloaded,
    OutsideTimeWindow,
    WeatherMismatch,
    NoObserver,
}

impl std::fmt::Display for GateBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateBlock::RegionUnloaded => write!(f, "region not loaded"),
            GateBlock::OutsideTimeWindow => write!(f, "outside time window"),
            GateBlock::WeatherMismatch => write!(f, "weather restriction not met"),
            GateBlock::NoObserver => write!(f, "no observer in range"),
        }
    }
}

/// Per-controller counters, cleared by `reset`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Metrics {
    pub spawned_total: u64,
    pub killed_total: u64,
    pub last_spawn_tick: Option<u64>,
}

pub struct PopulationController {
    id: SpawnerId,
    anchor: BlockPos,
    entries: Vec<PopulationEntry>,
    active: HashMap<UnitHandle, ActiveUnit>,
    respawns: RespawnQueue,
    props: ControllerProperties,
    visible: bool,
    display_mode: DisplayMode,
    metrics: Metrics,
}

impl PopulationController {
    pub fn new(anchor: BlockPos, entries: Vec<PopulationEntry>) -> Self {
        Self::restore(
            anchor,
            entries,
            ControllerProperties::default(),
            true,
            DisplayMode::default(),
        )
    }

    /// Rebuild a controller from persisted state.
    pub fn restore(
        anchor: BlockPos,
        entries: Vec<PopulationEntry>,
        props: ControllerProperties,
        visible: bool,
        display_mode: DisplayMode,
    ) -> Self {
        Self {
            id: anchor.spawner_id(),
            anchor,
            entries,
            active: HashMap::new(),
            respawns: RespawnQueue::new(),
            props,
            visible,
            display_mode,
            metrics: Metrics::default(),
        }
    }

    pub fn id(&self) -> &SpawnerId {
        &self.id
    }

    pub fn anchor(&self) -> &BlockPos {
        &self.anchor
    }

    pub fn entries(&self) -> &[PopulationEntry] {
        &self.entries
    }

    pub fn props(&self) -> &ControllerProperties {
        &self.props
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn group(&self) -> Option<&str> {
        self.props.group.as_deref()
    }

    /// Replace the entry list. Pending respawns whose key no longer exists
    /// are not purged here; they are dropped when they come due.
    pub fn set_entries(&mut self, entries: Vec<PopulationEntry>) {
        self.entries = entries;
    }

    pub fn live_count(&self) -> usize {
        self.active.len()
    }

    pub fn pending_count(&self) -> usize {
        self.respawns.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.respawns.is_empty()
    }

    pub fn desired_total(&self) -> u32 {
        spawnkeep_core::types::entry::desired_total(&self.entries)
    }

    pub fn effective_capacity(&self, defaults: &Defaults) -> u16 {
        self.props
            .capacity_override
            .unwrap_or(defaults.capacity)
            .min(MAX_CAPACITY)
    }

    pub fn detection_radius(&self, defaults: &Defaults) -> f64 {
        self.props
            .detection_radius_override
            .unwrap_or(defaults.detection_radius)
            .min(MAX_DETECTION_RADIUS)
    }

    pub fn active_handles(&self) -> impl Iterator<Item = UnitHandle> + '_ {
        self.active.keys().copied()
    }

    fn live_count_for(&self, key: &EntryKey) -> usize {
        self.active.values().filter(|u| &u.key == key).count()
    }

    fn entry_for(&self, key: &EntryKey) -> Option<&PopulationEntry> {
        self.entries.iter().find(|e| e.matches(key))
    }

    /// Environmental gating. All spawn paths fail closed on any miss.
    fn check_gate(&self, world: &dyn WorldQuery, defaults: &Defaults) -> Result<(), GateBlock> {
        if !world.is_region_loaded(&self.anchor) {
            return Err(GateBlock::RegionUnloaded);
        }
        let hour = world.current_hour(&self.anchor.world);
        if !self.props.time_restriction.allows(hour) {
            return Err(GateBlock::OutsideTimeWindow);
        }
        let weather = world.current_weather(&self.anchor.world);
        if !self.props.weather_restriction.allows(weather) {
            return Err(GateBlock::WeatherMismatch);
        }
        if !world.is_observer_nearby(&self.anchor, self.detection_radius(defaults)) {
            return Err(GateBlock::NoObserver);
        }
        Ok(())
    }

    /// Pick a candidate spawn point: uniform jitter within the configured
    /// radii, probing up to three cells straight up if the candidate lands
    /// in solid space, else anchor + 1 vertical unit.
    fn pick_spawn_point(&self, world: &dyn WorldQuery) -> BlockPos {
        let SpawnRadius { x: rx, y: ry, z: rz } = self.props.radius;
        let mut rng = rand::thread_rng();
        let jitter = |rng: &mut rand::rngs::ThreadRng, r: f64| -> i32 {
            if r <= 0.0 {
                0
            } else {
                rng.gen_range(-r..=r).round() as i32
            }
        };
        let dx = jitter(&mut rng, rx);
        let dy = jitter(&mut rng, ry);
        let dz = jitter(&mut rng, rz);
        let candidate = self.anchor.offset(dx, dy, dz);
        if !world.is_solid(&candidate) {
            return candidate;
        }
        for step in 1..=VERTICAL_PROBE_STEPS {
            let probed = candidate.offset(0, step, 0);
            if !world.is_solid(&probed) {
                return probed;
            }
        }
        self.anchor.offset(0, 1, 0)
    }

    /// Top up the population toward the declared composition.
    ///
    /// Computes `missing = desired - (live + pending)` per entry, then deals
    /// the available capacity slots round-robin over entries ordered by
    /// descending missing count, one unit per entry per round, so no entry
    /// is starved while another is still short. Fails closed (spawns
    /// nothing) when gating rejects. Returns the handles actually created.
    pub fn spawn_missing(
        &mut self,
        world: &dyn WorldQuery,
        factory: &mut dyn EntityFactory,
        defaults: &Defaults,
        now: u64,
    ) -> Vec<UnitHandle> {
        if let Err(block) = self.check_gate(world, defaults) {
            log::debug!("{}: spawn cycle skipped: {}", self.id, block);
            return Vec::new();
        }

        let occupied = self.live_count() + self.pending_count();
        let ceiling = (self.effective_capacity(defaults) as usize).min(self.desired_total() as usize);
        let mut slots = ceiling.saturating_sub(occupied);
        if slots == 0 {
            return Vec::new();
        }

        // (entry index, units still missing), largest missing first. The
        // sort is stable, so ties keep declaration order.
        let mut missing: Vec<(usize, usize)> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| {
                let have = self.live_count_for(&e.key()) + self.respawns.count_for_key(&e.key());
                let want = e.desired_count as usize;
                (want > have).then(|| (i, want - have))
            })
            .collect();
        missing.sort_by(|a, b| b.1.cmp(&a.1));

        let mut plan: Vec<usize> = Vec::new();
        while slots > 0 && !missing.is_empty() {
            for (idx, left) in missing.iter_mut() {
                if slots == 0 {
                    break;
                }
                plan.push(*idx);
                *left -= 1;
                slots -= 1;
            }
            missing.retain(|(_, left)| *left > 0);
        }

        let mut spawned = Vec::new();
        for idx in plan {
            let key = self.entries[idx].key();
            let point = self.pick_spawn_point(world);
            match factory.spawn(&point, &key) {
                Ok(handle) => {
                    self.active.insert(
                        handle,
                        ActiveUnit {
                            handle,
                            key,
                            spawned_tick: now,
                        },
                    );
                    self.metrics.spawned_total += 1;
                    self.metrics.last_spawn_tick = Some(now);
                    spawned.push(handle);
                }
                Err(SpawnDenied::UnknownSpecies(species)) => {
                    log::error!("{}: factory has no template for '{}'", self.id, species);
                }
                Err(denied) => {
                    log::warn!("{}: spawn of {} failed: {}", self.id, key, denied);
                }
            }
        }
        spawned
    }

    /// Death notification: move the unit from active to pending-respawn and
    /// arm its replacement. Unknown handles are a no-op, which is exactly
    /// what makes a straggler notification after `reset` inert.
    pub fn on_unit_removed(
        &mut self,
        handle: UnitHandle,
        delays: &dyn DifficultyDelay,
        now: u64,
    ) -> bool {
        let Some(unit) = self.active.remove(&handle) else {
            return false;
        };
        let delay = delays.respawn_delay(unit.key.tier, unit.key.elite);
        self.respawns.schedule(unit.key.clone(), now + delay);
        self.metrics.killed_total += 1;
        log::debug!(
            "{}: unit {} ({}) removed, replacement ready at tick {}",
            self.id,
            handle,
            unit.key,
            now + delay
        );
        true
    }

    /// Attempt the earliest-ready pending respawn, if any. At most one
    /// attempt per call. Blocked attempts are re-queued with a short
    /// backoff; a pending respawn whose entry key has been dropped from the
    /// configuration (or whose key is already at its desired count) is
    /// discarded instead of spawned.
    pub fn try_respawn_due(
        &mut self,
        world: &dyn WorldQuery,
        factory: &mut dyn EntityFactory,
        delays: &dyn DifficultyDelay,
        defaults: &Defaults,
        now: u64,
    ) -> Option<UnitHandle> {
        let pending = self.respawns.pop_ready(now)?;

        let desired = match self.entry_for(&pending.key) {
            Some(entry) => entry.desired_count as usize,
            None => {
                log::info!(
                    "{}: dropping pending respawn for removed entry {}",
                    self.id,
                    pending.key
                );
                return None;
            }
        };
        if self.live_count_for(&pending.key) + self.respawns.count_for_key(&pending.key) >= desired
        {
            log::info!(
                "{}: dropping surplus pending respawn for {}",
                self.id,
                pending.key
            );
            return None;
        }

        if !delays.can_respawn_now(&pending.key, now) {
            self.respawns.requeue(pending, now + RESPAWN_RETRY_TICKS);
            return None;
        }
        if let Err(block) = self.check_gate(world, defaults) {
            log::debug!("{}: respawn deferred: {}", self.id, block);
            self.respawns.requeue(pending, now + RESPAWN_RETRY_TICKS);
            return None;
        }

        let point = self.pick_spawn_point(world);
        match factory.spawn(&point, &pending.key) {
            Ok(handle) => {
                self.active.insert(
                    handle,
                    ActiveUnit {
                        handle,
                        key: pending.key,
                        spawned_tick: now,
                    },
                );
                self.metrics.spawned_total += 1;
                self.metrics.last_spawn_tick = Some(now);
                Some(handle)
            }
            Err(denied) => {
                log::warn!("{}: respawn of {} failed: {}", self.id, pending.key, denied);
                self.respawns.requeue(pending, now + RESPAWN_RETRY_TICKS);
                None
            }
        }
    }

    /// Drop active units whose handle no longer resolves in the world.
    /// No respawn is armed for them; the next fill cycle restores the
    /// population. Returns the dropped handles so the registry can unindex.
    pub fn sweep_stale(&mut self, world: &dyn WorldQuery) -> Vec<UnitHandle> {
        let stale: Vec<UnitHandle> = self
            .active
            .keys()
            .copied()
            .filter(|h| !world.is_unit_valid(*h))
            .collect();
        for handle in &stale {
            let _ = self.active.remove(handle);
            log::debug!("{}: swept stale unit {}", self.id, handle);
        }
        stale
    }

    /// Administrative re-initialization: clears active and pending state
    /// and the metrics. Idempotent; nothing queued survives.
    pub fn reset(&mut self, display: &mut dyn DisplayService) {
        self.active.clear();
        self.respawns.clear();
        self.metrics = Metrics::default();
        self.refresh_label(display);
        log::info!("{}: reset", self.id);
    }

    // -----------------------------------------------------------------------
    //  Property setters
    // -----------------------------------------------------------------------

    pub fn set_visible(&mut self, visible: bool, display: &mut dyn DisplayService) {
        self.visible = visible;
        if visible {
            self.refresh_label(display);
        } else {
            display.remove_label(&self.id);
        }
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode, display: &mut dyn DisplayService) {
        self.display_mode = mode;
        self.refresh_label(display);
    }

    pub fn set_capacity_override(&mut self, capacity: Option<u16>) {
        self.props.capacity_override = capacity.map(|c| c.min(MAX_CAPACITY));
    }

    pub fn set_detection_radius_override(&mut self, radius: Option<f64>) {
        self.props.detection_radius_override =
            radius.map(|r| r.clamp(0.0, MAX_DETECTION_RADIUS));
    }

    pub fn set_group(&mut self, group: Option<String>) {
        self.props.group = group;
    }

    pub fn set_display_name(&mut self, name: Option<String>, display: &mut dyn DisplayService) {
        self.props.display_name = name;
        self.refresh_label(display);
    }

    pub fn set_time_restriction(&mut self, restriction: TimeRestriction) {
        self.props.time_restriction = restriction;
    }

    pub fn set_weather_restriction(&mut self, restriction: WeatherRestriction) {
        self.props.weather_restriction = restriction;
    }

    pub fn set_spawn_radius(&mut self, radius: SpawnRadius) {
        self.props.radius = radius;
    }

    pub fn set_properties(&mut self, props: ControllerProperties) {
        self.props = props;
    }

    // -----------------------------------------------------------------------
    //  Display
    // -----------------------------------------------------------------------

    fn label_lines(&self) -> Vec<String> {
        let name = self
            .props
            .display_name
            .clone()
            .unwrap_or_else(|| self.id.to_string());
        match self.display_mode {
            DisplayMode::Hidden => Vec::new(),
            DisplayMode::NameOnly => vec![name],
            DisplayMode::Full => vec![
                name,
                codec::serialize_population(&self.entries),
                format!(
                    "live {} / pending {} / desired {}",
                    self.live_count(),
                    self.pending_count(),
                    self.desired_total()
                ),
            ],
        }
    }

    /// Push the current label to the display collaborator. Best effort;
    /// invisible or hidden controllers get their label removed instead.
    pub fn refresh_label(&self, display: &mut dyn DisplayService) {
        if self.visible && self.display_mode != DisplayMode::Hidden {
            display.upsert_label(&self.id, &self.anchor, &self.label_lines());
        } else {
            display.remove_label(&self.id);
        }
    }

    /// One-line status for `list` output.
    pub fn status_line(&self, defaults: &Defaults) -> String {
        format!(
            "{} [{}] live {}/{} pending {} cap {}",
            self.id,
            self.props.group.as_deref().unwrap_or("-"),
            self.live_count(),
            self.desired_total(),
            self.pending_count(),
            self.effective_capacity(defaults),
        )
    }

    /// Multi-line detail for `info` output.
    pub fn info_text(&self, defaults: &Defaults) -> String {
        let mut out = String::new();
        out.push_str(&format!("spawner {}\n", self.id));
        out.push_str(&format!("  anchor: {}\n", self.anchor));
        out.push_str(&format!(
            "  entries: {}\n",
            codec::serialize_population(&self.entries)
        ));
        out.push_str(&format!(
            "  live: {}  pending: {}  desired: {}  capacity: {}\n",
            self.live_count(),
            self.pending_count(),
            self.desired_total(),
            self.effective_capacity(defaults)
        ));
        out.push_str(&format!(
            "  visible: {}  mode: {:?}  group: {}\n",
            self.visible,
            self.display_mode,
            self.props.group.as_deref().unwrap_or("-")
        ));
        out.push_str(&format!(
            "  time: {:?}  weather: {:?}  detection: {:.1}\n",
            self.props.time_restriction,
            self.props.weather_restriction,
            self.detection_radius(defaults)
        ));
        out.push_str(&format!(
            "  spawned: {}  killed: {}",
            self.metrics.spawned_total, self.metrics.killed_total
        ));
        if let Some(tick) = self.respawns.earliest_ready() {
            out.push_str(&format!("  next respawn ready: tick {tick}"));
        }
        out
    }
}
