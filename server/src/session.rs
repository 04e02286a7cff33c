//! Interactive configuration sessions - the multi-step wizard an operator
//! walks through to build a population before a controller is committed.
//!
//! The machine is an explicit enum-tagged state with one transition
//! function; free-text tokenization stays in the command adapter. Nothing
//! touches the registry until the terminal commit, so a cancelled or
//! evicted session leaves no trace.

use std::collections::HashMap;

use spawnkeep_core::codec;
use spawnkeep_core::constants::{
    MAX_CAPACITY, MAX_DESIRED_PER_ENTRY, MAX_DETECTION_RADIUS, MAX_TIER, MIN_TIER,
    SESSION_IDLE_TICKS,
};
use spawnkeep_core::species::SpeciesCatalog;
use spawnkeep_core::types::{
    BlockPos, ControllerProperties, PopulationEntry, SpawnRadius, TimeRestriction,
    WeatherRestriction,
};

use crate::registry;

/// Where in the wizard a session currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStep {
    MobType,
    Tier,
    Elite,
    Amount,
    /// Branch point after each completed entry: add / advanced / done.
    NextAction,
    AdvancedProps,
    TemplateConfirm,
    FinalConfirm,
}

/// Entry under construction across the MobType/Tier/Elite/Amount steps.
#[derive(Clone, Debug, Default)]
struct DraftEntry {
    species: Option<String>,
    tier: Option<u8>,
    elite: Option<bool>,
}

/// Everything the registry needs to install the configured controller.
#[derive(Clone, Debug)]
pub struct CommitPayload {
    pub anchor: BlockPos,
    pub entries: Vec<PopulationEntry>,
    pub props: ControllerProperties,
}

/// Outcome of feeding one input line to a session.
#[derive(Clone, Debug)]
pub enum SessionReply {
    /// Session continues; show this prompt (possibly carrying an error
    /// preamble for invalid input).
    Prompt(String),
    /// Terminal: commit the payload.
    Committed(CommitPayload),
    /// Terminal: session is gone, nothing was applied.
    Cancelled(String),
}

pub struct ConfigSession {
    operator: String,
    anchor: BlockPos,
    step: SessionStep,
    entries: Vec<PopulationEntry>,
    draft: DraftEntry,
    props: ControllerProperties,
    started_at: chrono::DateTime<chrono::Local>,
    last_input_tick: u64,
}

impl ConfigSession {
    pub fn new(operator: impl Into<String>, anchor: BlockPos, now_tick: u64) -> Self {
        Self {
            operator: operator.into(),
            anchor,
            step: SessionStep::MobType,
            entries: Vec::new(),
            draft: DraftEntry::default(),
            props: ControllerProperties::default(),
            started_at: chrono::Local::now(),
            last_input_tick: now_tick,
        }
    }

    pub fn step(&self) -> SessionStep {
        self.step
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn started_at(&self) -> chrono::DateTime<chrono::Local> {
        self.started_at
    }

    fn idle_since(&self, now_tick: u64) -> u64 {
        now_tick.saturating_sub(self.last_input_tick)
    }

    /// The prompt shown when entering the current step.
    pub fn prompt(&self) -> String {
        match self.step {
            SessionStep::MobType => {
                "Species id? (or 'template:<name>', 'cancel')".to_string()
            }
            SessionStep::Tier => format!("Tier? ({MIN_TIER}-{MAX_TIER})"),
            SessionStep::Elite => "Elite? (true/false)".to_string(),
            SessionStep::Amount => format!("How many? (1-{MAX_DESIRED_PER_ENTRY})"),
            SessionStep::NextAction => {
                "'add' another entry, 'advanced' settings, or 'done'".to_string()
            }
            SessionStep::AdvancedProps => {
                "advanced> group|name|capacity|detection|radius|time|weather <value>, or 'done'"
                    .to_string()
            }
            SessionStep::TemplateConfirm | SessionStep::FinalConfirm => format!(
                "Install {} at {}? ('confirm' or 'cancel')",
                codec::serialize_population(&self.entries),
                self.anchor
            ),
        }
    }

    fn invalid(&self, why: impl std::fmt::Display) -> SessionReply {
        SessionReply::Prompt(format!("{}. {}", why, self.prompt()))
    }

    fn advance(&mut self, step: SessionStep) -> SessionReply {
        self.step = step;
        SessionReply::Prompt(self.prompt())
    }

    /// Feed one tokenized input line through the transition table.
    pub fn handle(
        &mut self,
        raw: &str,
        catalog: &dyn SpeciesCatalog,
        now_tick: u64,
    ) -> SessionReply {
        self.last_input_tick = now_tick;
        let input = raw.trim();
        if input.eq_ignore_ascii_case("cancel") {
            return SessionReply::Cancelled("Session cancelled, nothing applied".to_string());
        }

        match self.step {
            SessionStep::MobType => self.on_mob_type(input, catalog),
            SessionStep::Tier => self.on_tier(input),
            SessionStep::Elite => self.on_elite(input),
            SessionStep::Amount => self.on_amount(input),
            SessionStep::NextAction => self.on_next_action(input),
            SessionStep::AdvancedProps => self.on_advanced(input),
            SessionStep::TemplateConfirm | SessionStep::FinalConfirm => self.on_confirm(input),
        }
    }

    fn on_mob_type(&mut self, input: &str, catalog: &dyn SpeciesCatalog) -> SessionReply {
        if let Some(name) = input.strip_prefix("template:") {
            let Some(data) = registry::template(name) else {
                return self.invalid(format!("Unknown template '{name}'"));
            };
            let out = codec::parse_population(data, catalog);
            self.entries = out.entries;
            return self.advance(SessionStep::TemplateConfirm);
        }
        let species = input.to_lowercase();
        if !catalog.is_known(&species) {
            return self.invalid(format!("Unknown species '{input}'"));
        }
        self.draft = DraftEntry {
            species: Some(species),
            ..DraftEntry::default()
        };
        self.advance(SessionStep::Tier)
    }

    fn on_tier(&mut self, input: &str) -> SessionReply {
        match input.parse::<u8>() {
            Ok(tier) if (MIN_TIER..=MAX_TIER).contains(&tier) => {
                self.draft.tier = Some(tier);
                self.advance(SessionStep::Elite)
            }
            _ => self.invalid(format!("'{input}' is not a tier")),
        }
    }

    fn on_elite(&mut self, input: &str) -> SessionReply {
        match input {
            "true" => {
                self.draft.elite = Some(true);
                self.advance(SessionStep::Amount)
            }
            "false" => {
                self.draft.elite = Some(false);
                self.advance(SessionStep::Amount)
            }
            _ => self.invalid(format!("'{input}' is not 'true' or 'false'")),
        }
    }

    fn on_amount(&mut self, input: &str) -> SessionReply {
        let count = match input.parse::<u16>() {
            Ok(c) if (1..=MAX_DESIRED_PER_ENTRY).contains(&c) => c,
            _ => return self.invalid(format!("'{input}' is not a count")),
        };
        // The three draft fields are all set by the time this step runs.
        let entry = PopulationEntry::new(
            self.draft.species.clone().unwrap_or_default(),
            self.draft.tier.unwrap_or(MIN_TIER),
            self.draft.elite.unwrap_or(false),
            count,
        );
        if self.entries.iter().any(|e| e.matches(&entry.key())) {
            self.draft = DraftEntry::default();
            self.step = SessionStep::NextAction;
            return self.invalid(format!(
                "{} is already declared; counts are not merged",
                entry.key()
            ));
        }
        let recorded = entry.key().to_string();
        self.entries.push(entry);
        self.draft = DraftEntry::default();
        self.step = SessionStep::NextAction;
        SessionReply::Prompt(format!("Recorded {}#{}. {}", recorded, input, self.prompt()))
    }

    fn on_next_action(&mut self, input: &str) -> SessionReply {
        match input {
            "add" => self.advance(SessionStep::MobType),
            "advanced" => self.advance(SessionStep::AdvancedProps),
            "done" => {
                if self.entries.is_empty() {
                    self.invalid("No entries declared yet")
                } else {
                    self.advance(SessionStep::FinalConfirm)
                }
            }
            _ => self.invalid(format!("'{input}' is not one of add/advanced/done")),
        }
    }

    fn on_advanced(&mut self, input: &str) -> SessionReply {
        let mut parts = input.split_whitespace();
        let Some(command) = parts.next() else {
            return self.invalid("Empty command");
        };
        let args: Vec<&str> = parts.collect();
        match command {
            "done" => {
                if self.entries.is_empty() {
                    self.invalid("No entries declared yet")
                } else {
                    self.advance(SessionStep::FinalConfirm)
                }
            }
            "group" => match args.first() {
                Some(&"none") => {
                    self.props.group = None;
                    SessionReply::Prompt("Group cleared".to_string())
                }
                Some(name) => {
                    self.props.group = Some((*name).to_string());
                    SessionReply::Prompt(format!("Group set to '{name}'"))
                }
                None => self.invalid("Usage: group <name|none>"),
            },
            "name" => {
                if args.is_empty() {
                    self.invalid("Usage: name <display name>")
                } else {
                    let name = args.join(" ");
                    self.props.display_name = Some(name.clone());
                    SessionReply::Prompt(format!("Display name set to '{name}'"))
                }
            }
            "capacity" => match args.first().and_then(|a| a.parse::<u16>().ok()) {
                Some(cap) if cap >= 1 && cap <= MAX_CAPACITY => {
                    self.props.capacity_override = Some(cap);
                    SessionReply::Prompt(format!("Capacity override set to {cap}"))
                }
                _ => self.invalid(format!("Usage: capacity <1-{MAX_CAPACITY}>")),
            },
            "detection" => match args.first().and_then(|a| a.parse::<f64>().ok()) {
                Some(r) if r > 0.0 && r <= MAX_DETECTION_RADIUS => {
                    self.props.detection_radius_override = Some(r);
                    SessionReply::Prompt(format!("Detection radius set to {r:.1}"))
                }
                _ => self.invalid(format!("Usage: detection <0-{MAX_DETECTION_RADIUS:.0}>")),
            },
            "radius" => {
                let parsed: Vec<f64> = args.iter().filter_map(|a| a.parse().ok()).collect();
                match parsed.as_slice() {
                    [x, y, z] if *x >= 0.0 && *y >= 0.0 && *z >= 0.0 => {
                        self.props.radius = SpawnRadius {
                            x: *x,
                            y: *y,
                            z: *z,
                        };
                        SessionReply::Prompt(format!("Spawn radius set to {x} {y} {z}"))
                    }
                    _ => self.invalid("Usage: radius <x> <y> <z>"),
                }
            }
            "time" => match args.first() {
                Some(&"any") => {
                    self.props.time_restriction = TimeRestriction::Any;
                    SessionReply::Prompt("Time restriction cleared".to_string())
                }
                Some(window) => match parse_hour_window(window) {
                    Some((from_hour, to_hour)) => {
                        self.props.time_restriction = TimeRestriction::Window { from_hour, to_hour };
                        SessionReply::Prompt(format!("Time window set to {from_hour}-{to_hour}"))
                    }
                    None => self.invalid("Usage: time <any|from-to> with hours 0-23"),
                },
                None => self.invalid("Usage: time <any|from-to>"),
            },
            "weather" => match args.first() {
                Some(&"any") => {
                    self.props.weather_restriction = WeatherRestriction::Any;
                    SessionReply::Prompt("Weather restriction cleared".to_string())
                }
                Some(&"clear") => {
                    self.props.weather_restriction = WeatherRestriction::RequireClear;
                    SessionReply::Prompt("Weather restriction set to clear".to_string())
                }
                Some(&"rain") => {
                    self.props.weather_restriction = WeatherRestriction::RequireRain;
                    SessionReply::Prompt("Weather restriction set to rain".to_string())
                }
                _ => self.invalid("Usage: weather <any|clear|rain>"),
            },
            _ => self.invalid(format!("Unknown advanced command '{command}'")),
        }
    }

    fn on_confirm(&mut self, input: &str) -> SessionReply {
        if input != "confirm" {
            return self.invalid("Type 'confirm' to commit");
        }
        SessionReply::Committed(CommitPayload {
            anchor: self.anchor.clone(),
            entries: self.entries.clone(),
            props: self.props.clone(),
        })
    }
}

/// Parse an `H-H` hour window.
pub(crate) fn parse_hour_window(input: &str) -> Option<(u8, u8)> {
    let (from, to) = input.split_once('-')?;
    let from: u8 = from.trim().parse().ok()?;
    let to: u8 = to.trim().parse().ok()?;
    (from < 24 && to < 24).then_some((from, to))
}

/// Per-operator session directory with idle eviction.
#[derive(Default)]
pub struct SessionManager {
    sessions: HashMap<String, ConfigSession>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn has(&self, operator: &str) -> bool {
        self.sessions.contains_key(operator)
    }

    /// Start (or restart) a session for `operator`. Returns the first
    /// prompt.
    pub fn begin(&mut self, operator: &str, anchor: BlockPos, now_tick: u64) -> String {
        let session = ConfigSession::new(operator, anchor, now_tick);
        let prompt = session.prompt();
        if self
            .sessions
            .insert(operator.to_string(), session)
            .is_some()
        {
            log::info!("operator {operator} restarted their configuration session");
        }
        prompt
    }

    /// Route input to the operator's session, if any. Terminal replies
    /// destroy the session; the commit payload is the caller's to apply.
    pub fn handle(
        &mut self,
        operator: &str,
        raw: &str,
        catalog: &dyn SpeciesCatalog,
        now_tick: u64,
    ) -> Option<SessionReply> {
        let session = self.sessions.get_mut(operator)?;
        let reply = session.handle(raw, catalog, now_tick);
        if matches!(
            reply,
            SessionReply::Committed(_) | SessionReply::Cancelled(_)
        ) {
            let _ = self.sessions.remove(operator);
        }
        Some(reply)
    }

    pub fn cancel(&mut self, operator: &str) -> bool {
        self.sessions.remove(operator).is_some()
    }

    /// Evict sessions idle beyond the timeout; evicted sessions are
    /// treated exactly like cancelled ones. Returns the evicted operators.
    pub fn evict_idle(&mut self, now_tick: u64) -> Vec<String> {
        let expired: Vec<String> = self
            .sessions
            .values()
            .filter(|s| s.idle_since(now_tick) >= SESSION_IDLE_TICKS)
            .map(|s| s.operator().to_string())
            .collect();
        for operator in &expired {
            let _ = self.sessions.remove(operator);
            log::info!("evicted idle configuration session for {operator}");
        }
        expired
    }
}
