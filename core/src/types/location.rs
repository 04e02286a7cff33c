use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// A block-aligned spawn anchor. Controllers are keyed by these integer
/// coordinates exclusively; raw floating-point locations are snapped to the
/// containing block before they ever reach the registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Encode, Decode, Serialize, Deserialize)]
pub struct BlockPos {
    pub world: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(world: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// Snap a floating-point location in `world` to its containing block.
    pub fn from_exact(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self::new(
            world,
            x.floor() as i32,
            y.floor() as i32,
            z.floor() as i32,
        )
    }

    /// The stable registry key derived from this position. Idempotent across
    /// reloads: the same block always yields the same id.
    pub fn spawner_id(&self) -> SpawnerId {
        SpawnerId(format!("{}_{}_{}_{}", self.world, self.x, self.y, self.z))
    }

    /// The snapshot-store key component, `world,x,y,z`.
    pub fn storage_key(&self) -> String {
        format!("{},{},{},{}", self.world, self.x, self.y, self.z)
    }

    /// Parse a `world,x,y,z` storage key back into a position.
    pub fn from_storage_key(key: &str) -> Option<Self> {
        let mut parts = key.split(',');
        let world = parts.next()?;
        if world.is_empty() {
            return None;
        }
        let x = parts.next()?.trim().parse().ok()?;
        let y = parts.next()?.trim().parse().ok()?;
        let z = parts.next()?.trim().parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(world, x, y, z))
    }

    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(
            self.world.clone(),
            self.x + dx,
            self.y + dy,
            self.z + dz,
        )
    }

    /// Squared distance to another position, ignoring world membership.
    pub fn distance_sq(&self, other: &BlockPos) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        let dz = (self.z - other.z) as f64;
        dx * dx + dy * dy + dz * dz
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {}, {})", self.world, self.x, self.y, self.z)
    }
}

/// Stable controller identifier, `world_x_y_z`.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Serialize, Deserialize,
)]
pub struct SpawnerId(pub String);

impl SpawnerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SpawnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
