pub mod entry;
pub mod location;
pub mod properties;
pub mod unit;

pub use entry::{EntryKey, PopulationEntry};
pub use location::{BlockPos, SpawnerId};
pub use properties::{
    ControllerProperties, DisplayMode, SpawnRadius, TimeRestriction, Weather, WeatherRestriction,
};
pub use unit::{ActiveUnit, UnitHandle};
