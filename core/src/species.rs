//! Species catalog - the set of unit kinds the codec will accept.
//!
//! The catalog is a collaborator so deployments can swap in one backed by
//! their content pipeline; the compiled-in list covers the stock bestiary.

/// Lookup interface consulted by the codec and the configuration session.
pub trait SpeciesCatalog {
    /// Whether `species` is a recognized canonical id. Ids are lowercase;
    /// callers pass input verbatim and get a miss for wrong casing.
    fn is_known(&self, species: &str) -> bool;

    /// All known ids, for listings and prompts.
    fn all(&self) -> &[&'static str];
}

/// Stock bestiary ids, kept sorted for the binary search in `is_known`.
const STOCK_SPECIES: &[&str] = &[
    "blaze",
    "bogling",
    "cave_spider",
    "creeper",
    "drowned",
    "enderman",
    "ghast",
    "husk",
    "magma_cube",
    "phantom",
    "pillager",
    "ravager",
    "silverfish",
    "skeleton",
    "slime",
    "spider",
    "stray",
    "vindicator",
    "witch",
    "wither_skeleton",
    "zombie",
    "zombie_villager",
];

/// Catalog backed by the compiled-in species list.
#[derive(Clone, Copy, Debug, Default)]
pub struct StockCatalog;

impl SpeciesCatalog for StockCatalog {
    fn is_known(&self, species: &str) -> bool {
        STOCK_SPECIES.binary_search(&species).is_ok()
    }

    fn all(&self) -> &[&'static str] {
        STOCK_SPECIES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_catalog_knows_common_species() {
        let catalog = StockCatalog;
        assert!(catalog.is_known("zombie"));
        assert!(catalog.is_known("wither_skeleton"));
        assert!(!catalog.is_known("dragon"));
        assert!(!catalog.is_known("Zombie"));
    }

    /// The binary search in `is_known` requires the list to stay sorted.
    #[test]
    fn stock_list_is_sorted() {
        let mut sorted = STOCK_SPECIES.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOCK_SPECIES);
    }
}
