//! Constants module - tuning values shared by the registry, controllers and sessions

// =============================================================================
// Timing
// =============================================================================

/// Ticks per second
pub const TICKS: i64 = 20;
/// Microseconds per tick
pub const TICK: i64 = 1_000_000 / TICKS;

// =============================================================================
// Population limits
// =============================================================================

/// Lowest difficulty tier an entry may declare
pub const MIN_TIER: u8 = 1;
/// Highest difficulty tier an entry may declare
pub const MAX_TIER: u8 = 6;

/// Highest desired count a single entry may declare
pub const MAX_DESIRED_PER_ENTRY: u16 = 20;

/// Registry-wide live+pending cap applied when a controller has no override
pub const DEFAULT_CAPACITY: u16 = 10;
/// Hard ceiling for capacity overrides set by operators
pub const MAX_CAPACITY: u16 = 64;

/// Observer detection radius (blocks) when a controller has no override
pub const DEFAULT_DETECTION_RADIUS: f64 = 32.0;
/// Largest detection radius an operator may configure
pub const MAX_DETECTION_RADIUS: f64 = 128.0;

/// Default horizontal spawn jitter (blocks)
pub const DEFAULT_SPAWN_RADIUS_XZ: f64 = 4.0;
/// Default vertical spawn jitter (blocks)
pub const DEFAULT_SPAWN_RADIUS_Y: f64 = 1.0;

/// Cells probed straight up when a jittered spawn point lands in solid space
pub const VERTICAL_PROBE_STEPS: i32 = 3;

// =============================================================================
// Respawn scheduling
// =============================================================================

/// Backoff applied when a due respawn is blocked (chunk unloaded, gating,
/// capacity, global cooldown) before the next attempt
pub const RESPAWN_RETRY_TICKS: u64 = 3 * TICKS as u64;

// =============================================================================
// Registry maintenance intervals
// =============================================================================

/// Ticks between snapshot handoffs to the background saver (~30s)
pub const SAVE_INTERVAL_TICKS: u64 = 30 * TICKS as u64;

/// Ticks between stale unit-handle sweeps (~5s)
pub const SWEEP_INTERVAL_TICKS: u64 = 5 * TICKS as u64;

/// Ticks between group index rebuilds (~60s)
pub const GROUP_REBUILD_INTERVAL_TICKS: u64 = 60 * TICKS as u64;

// =============================================================================
// Configuration sessions
// =============================================================================

/// Idle ticks after which an unfinished configuration session is evicted
/// and treated as cancelled (5 minutes)
pub const SESSION_IDLE_TICKS: u64 = 300 * TICKS as u64;

// =============================================================================
// Persistence
// =============================================================================

/// Schema version written to `spawner:meta:version`
pub const SCHEMA_VERSION: u32 = 2;

/// Local fallback file written when a snapshot save fails before the retry
pub const BACKUP_FILE: &str = "spawner-backup.bin";
