//! Entry codec - parses and serializes the declarative population format.
//!
//! One population is a comma-separated list of `species:tier@elite#count`
//! tokens, e.g. `skeleton:3@false#2,zombie:3@true#1`. Parsing is strict per
//! token but fault-tolerant per string: a malformed token is rejected with a
//! diagnostic and the remaining tokens are still processed.

use crate::constants::{MAX_DESIRED_PER_ENTRY, MAX_TIER, MIN_TIER};
use crate::species::SpeciesCatalog;
use crate::types::PopulationEntry;

/// Reason a single token was rejected. Carries the offending token so the
/// operator-facing surfaces can echo it back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryParseError {
    EmptyToken,
    MissingTier(String),
    BadTier(String),
    TierOutOfRange(String),
    BadElite(String),
    MissingCount(String),
    BadCount(String),
    CountOutOfRange(String),
    UnknownSpecies(String),
}

impl std::fmt::Display for EntryParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryParseError::EmptyToken => write!(f, "empty entry token"),
            EntryParseError::MissingTier(t) => write!(f, "'{t}': missing ':tier' part"),
            EntryParseError::BadTier(t) => write!(f, "'{t}': tier is not an integer"),
            EntryParseError::TierOutOfRange(t) => {
                write!(f, "'{t}': tier must be {MIN_TIER}..={MAX_TIER}")
            }
            EntryParseError::BadElite(t) => {
                write!(f, "'{t}': elite flag must be 'true' or 'false'")
            }
            EntryParseError::MissingCount(t) => write!(f, "'{t}': missing '#count' part"),
            EntryParseError::BadCount(t) => write!(f, "'{t}': count is not an integer"),
            EntryParseError::CountOutOfRange(t) => {
                write!(f, "'{t}': count must be 1..={MAX_DESIRED_PER_ENTRY}")
            }
            EntryParseError::UnknownSpecies(t) => write!(f, "'{t}': unknown species"),
        }
    }
}

/// Result of parsing a population string: the entries that passed and a
/// diagnostic per token that did not.
#[derive(Clone, Debug, Default)]
pub struct ParseOutcome {
    pub entries: Vec<PopulationEntry>,
    pub rejected: Vec<EntryParseError>,
}

impl ParseOutcome {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Parse one `species:tier@elite#count` token.
pub fn parse_entry(
    token: &str,
    catalog: &dyn SpeciesCatalog,
) -> Result<PopulationEntry, EntryParseError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(EntryParseError::EmptyToken);
    }
    let whole = token.to_string();

    let (species, rest) = token
        .split_once(':')
        .ok_or_else(|| EntryParseError::MissingTier(whole.clone()))?;
    let (tier_part, rest) = rest
        .split_once('@')
        .ok_or_else(|| EntryParseError::BadElite(whole.clone()))?;
    let (elite_part, count_part) = rest
        .split_once('#')
        .ok_or_else(|| EntryParseError::MissingCount(whole.clone()))?;

    let species = species.trim();
    if !catalog.is_known(species) {
        return Err(EntryParseError::UnknownSpecies(whole));
    }

    let tier: u8 = tier_part
        .trim()
        .parse()
        .map_err(|_| EntryParseError::BadTier(whole.clone()))?;
    if !(MIN_TIER..=MAX_TIER).contains(&tier) {
        return Err(EntryParseError::TierOutOfRange(whole));
    }

    let elite = match elite_part.trim() {
        "true" => true,
        "false" => false,
        _ => return Err(EntryParseError::BadElite(whole)),
    };

    let count: u16 = count_part
        .trim()
        .parse()
        .map_err(|_| EntryParseError::BadCount(whole.clone()))?;
    if count == 0 || count > MAX_DESIRED_PER_ENTRY {
        return Err(EntryParseError::CountOutOfRange(whole));
    }

    Ok(PopulationEntry::new(species, tier, elite, count))
}

/// Parse a full population string. Malformed tokens are collected as
/// diagnostics; valid siblings still contribute entries.
pub fn parse_population(input: &str, catalog: &dyn SpeciesCatalog) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    for token in input.split(',') {
        if token.trim().is_empty() {
            // Trailing commas are tolerated silently.
            continue;
        }
        match parse_entry(token, catalog) {
            Ok(entry) => outcome.entries.push(entry),
            Err(err) => {
                log::warn!("rejected population token: {err}");
                outcome.rejected.push(err);
            }
        }
    }
    outcome
}

/// Serialize entries back into the declarative format. Inverse of
/// [`parse_population`] up to token order and whitespace.
pub fn serialize_population(entries: &[PopulationEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}:{}@{}#{}", e.species, e.tier, e.elite, e.desired_count))
        .collect::<Vec<_>>()
        .join(",")
}

/// Validation applied at the commit boundary, over and above per-token
/// parsing: ranges are re-checked (entries may arrive from a session rather
/// than the codec) and duplicate entry keys are reported.
pub fn validate(
    entries: &[PopulationEntry],
    catalog: &dyn SpeciesCatalog,
) -> Result<(), Vec<String>> {
    let mut problems = Vec::new();
    for entry in entries {
        if !catalog.is_known(&entry.species) {
            problems.push(format!("unknown species '{}'", entry.species));
        }
        if !(MIN_TIER..=MAX_TIER).contains(&entry.tier) {
            problems.push(format!("{}: tier {} out of range", entry.species, entry.tier));
        }
        if entry.desired_count == 0 || entry.desired_count > MAX_DESIRED_PER_ENTRY {
            problems.push(format!(
                "{}: count {} out of range",
                entry.species, entry.desired_count
            ));
        }
    }
    for (i, entry) in entries.iter().enumerate() {
        if entries[..i].iter().any(|prior| prior.matches(&entry.key())) {
            problems.push(format!("duplicate entry key {}", entry.key()));
        }
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::species::StockCatalog;
    use crate::types::EntryKey;
    use std::collections::HashMap;

    fn multiset(entries: &[PopulationEntry]) -> HashMap<EntryKey, u16> {
        let mut map = HashMap::new();
        for e in entries {
            *map.entry(e.key()).or_insert(0) += e.desired_count;
        }
        map
    }

    #[test]
    fn parses_two_entry_string() {
        let out = parse_population("skeleton:3@false#2,zombie:3@true#1", &StockCatalog);
        assert!(out.is_clean());
        assert_eq!(out.entries.len(), 2);
        assert_eq!(out.entries[0], PopulationEntry::new("skeleton", 3, false, 2));
        assert_eq!(out.entries[1], PopulationEntry::new("zombie", 3, true, 1));
    }

    /// Round-trip law: serialize(parse(s)) has the same multiset of
    /// (key, count) as s.
    #[test]
    fn round_trip_preserves_multiset() {
        let input = "spider:2@false#5, creeper:1@false#3 ,witch:4@true#1";
        let first = parse_population(input, &StockCatalog);
        assert!(first.is_clean());
        let rendered = serialize_population(&first.entries);
        let second = parse_population(&rendered, &StockCatalog);
        assert!(second.is_clean());
        assert_eq!(multiset(&first.entries), multiset(&second.entries));
    }

    /// A token missing its '#count' part contributes nothing; the sibling
    /// token still parses.
    #[test]
    fn malformed_token_is_isolated() {
        let out = parse_population("zombie:2@false,skeleton:1@false#4", &StockCatalog);
        assert_eq!(out.entries.len(), 1);
        assert_eq!(out.entries[0].species, "skeleton");
        assert_eq!(
            out.rejected,
            vec![EntryParseError::MissingCount("zombie:2@false".into())]
        );
    }

    #[test]
    fn rejects_out_of_range_fields() {
        assert_eq!(
            parse_entry("zombie:7@false#1", &StockCatalog),
            Err(EntryParseError::TierOutOfRange("zombie:7@false#1".into()))
        );
        assert_eq!(
            parse_entry("zombie:0@false#1", &StockCatalog),
            Err(EntryParseError::TierOutOfRange("zombie:0@false#1".into()))
        );
        assert_eq!(
            parse_entry("zombie:2@false#0", &StockCatalog),
            Err(EntryParseError::CountOutOfRange("zombie:2@false#0".into()))
        );
        assert_eq!(
            parse_entry("zombie:2@false#21", &StockCatalog),
            Err(EntryParseError::CountOutOfRange("zombie:2@false#21".into()))
        );
    }

    /// The elite flag accepts exactly the literals 'true' and 'false'.
    #[test]
    fn rejects_nonliteral_elite() {
        assert_eq!(
            parse_entry("zombie:2@yes#1", &StockCatalog),
            Err(EntryParseError::BadElite("zombie:2@yes#1".into()))
        );
        assert_eq!(
            parse_entry("zombie:2@TRUE#1", &StockCatalog),
            Err(EntryParseError::BadElite("zombie:2@TRUE#1".into()))
        );
    }

    #[test]
    fn rejects_unknown_species() {
        assert_eq!(
            parse_entry("dragon:2@false#1", &StockCatalog),
            Err(EntryParseError::UnknownSpecies("dragon:2@false#1".into()))
        );
    }

    #[test]
    fn tolerates_trailing_comma() {
        let out = parse_population("zombie:2@false#1,", &StockCatalog);
        assert!(out.is_clean());
        assert_eq!(out.entries.len(), 1);
    }

    /// Duplicate keys are a data-quality problem surfaced by validate, not
    /// merged away by the parser.
    #[test]
    fn validate_reports_duplicate_keys() {
        let out = parse_population("zombie:2@false#1,zombie:2@false#3", &StockCatalog);
        assert!(out.is_clean());
        assert_eq!(out.entries.len(), 2);
        let err = validate(&out.entries, &StockCatalog).unwrap_err();
        assert_eq!(err.len(), 1);
        assert!(err[0].contains("duplicate"));
    }

    #[test]
    fn validate_accepts_clean_population() {
        let entries = vec![
            PopulationEntry::new("zombie", 2, false, 1),
            PopulationEntry::new("zombie", 3, false, 1),
        ];
        assert!(validate(&entries, &StockCatalog).is_ok());
    }
}
