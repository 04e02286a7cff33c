use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Identity of a population entry. Two entries with the same species, tier
/// and elite flag describe the same kind of unit regardless of how many are
/// desired.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Serialize, Deserialize,
)]
pub struct EntryKey {
    /// Lowercase canonical species id, e.g. `skeleton`.
    pub species: String,
    /// Difficulty tier, 1..=6.
    pub tier: u8,
    pub elite: bool,
}

impl std::fmt::Display for EntryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}@{}", self.species, self.tier, self.elite)
    }
}

/// One declared population requirement: how many units of a given kind the
/// controller should keep alive. Immutable once constructed; the codec and
/// the configuration session are the only producers.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct PopulationEntry {
    pub species: String,
    pub tier: u8,
    pub elite: bool,
    pub desired_count: u16,
}

impl PopulationEntry {
    pub fn new(species: impl Into<String>, tier: u8, elite: bool, desired_count: u16) -> Self {
        Self {
            species: species.into(),
            tier,
            elite,
            desired_count,
        }
    }

    pub fn key(&self) -> EntryKey {
        EntryKey {
            species: self.species.clone(),
            tier: self.tier,
            elite: self.elite,
        }
    }

    pub fn matches(&self, key: &EntryKey) -> bool {
        self.species == key.species && self.tier == key.tier && self.elite == key.elite
    }
}

/// Sum of desired counts over a population.
pub fn desired_total(entries: &[PopulationEntry]) -> u32 {
    entries.iter().map(|e| e.desired_count as u32).sum()
}
