use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_SPAWN_RADIUS_XZ, DEFAULT_SPAWN_RADIUS_Y};

/// Current weather reported by the world for a given dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub enum Weather {
    Clear,
    Rain,
    Thunder,
}

/// Weather precondition a controller may require before spawning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub enum WeatherRestriction {
    #[default]
    Any,
    RequireClear,
    /// Satisfied by rain or thunder.
    RequireRain,
}

impl WeatherRestriction {
    pub fn allows(&self, weather: Weather) -> bool {
        match self {
            WeatherRestriction::Any => true,
            WeatherRestriction::RequireClear => weather == Weather::Clear,
            WeatherRestriction::RequireRain => {
                weather == Weather::Rain || weather == Weather::Thunder
            }
        }
    }
}

/// Time-of-day precondition. Windows are inclusive of `from_hour` and
/// exclusive of `to_hour`, and may wrap midnight (`20..6`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub enum TimeRestriction {
    #[default]
    Any,
    Window {
        from_hour: u8,
        to_hour: u8,
    },
}

impl TimeRestriction {
    pub fn allows(&self, hour: u8) -> bool {
        match *self {
            TimeRestriction::Any => true,
            TimeRestriction::Window { from_hour, to_hour } => {
                if from_hour <= to_hour {
                    hour >= from_hour && hour < to_hour
                } else {
                    hour >= from_hour || hour < to_hour
                }
            }
        }
    }
}

/// How the floating label above a spawner anchor is rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
#[repr(u8)]
pub enum DisplayMode {
    Hidden = 0,
    NameOnly = 1,
    #[default]
    Full = 2,
}

impl DisplayMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(DisplayMode::Hidden),
            1 => Some(DisplayMode::NameOnly),
            2 => Some(DisplayMode::Full),
            _ => None,
        }
    }
}

/// Independent jitter radii applied around the anchor when picking a spawn
/// point.
#[derive(Clone, Copy, Debug, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct SpawnRadius {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for SpawnRadius {
    fn default() -> Self {
        Self {
            x: DEFAULT_SPAWN_RADIUS_XZ,
            y: DEFAULT_SPAWN_RADIUS_Y,
            z: DEFAULT_SPAWN_RADIUS_XZ,
        }
    }
}

/// Persisted per-controller settings beyond the entry list itself. Stored
/// as the `props` blob in the snapshot hash.
#[derive(Clone, Debug, Default, PartialEq, Encode, Decode, Serialize, Deserialize)]
pub struct ControllerProperties {
    pub group: Option<String>,
    pub display_name: Option<String>,
    pub time_restriction: TimeRestriction,
    pub weather_restriction: WeatherRestriction,
    pub radius: SpawnRadius,
    pub capacity_override: Option<u16>,
    pub detection_radius_override: Option<f64>,
}
