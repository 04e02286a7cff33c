//! Operator command adapter - a thin text layer over the registry and the
//! session manager.
//!
//! The adapter tokenizes and routes; every piece of state lives behind it.
//! While an operator has a configuration session open, all of their input
//! flows into the session.

use spawnkeep_core::codec;
use spawnkeep_core::species::SpeciesCatalog;
use spawnkeep_core::traits::DisplayService;
use spawnkeep_core::types::{
    BlockPos, DisplayMode, SpawnRadius, TimeRestriction, WeatherRestriction,
};

use crate::background_saver::{BackgroundSaver, SaveJob};
use crate::registry::{self, SpawnRegistry};
use crate::session::{parse_hour_window, SessionManager, SessionReply};

pub struct CommandContext<'a> {
    pub registry: &'a mut SpawnRegistry,
    pub sessions: &'a mut SessionManager,
    pub catalog: &'a dyn SpeciesCatalog,
    pub display: &'a mut dyn DisplayService,
    /// Absent in tests; command handlers that persist simply skip it.
    pub saver: Option<&'a BackgroundSaver>,
    pub now_tick: u64,
}

const HELP: &str = "\
spawner create <world> <x> <y> <z>      start a configuration session
spawner template <name> <world> <x> <y> <z>  instantiate a template
spawner remove <world> <x> <y> <z>
spawner reset <world> <x> <y> <z>
spawner info <world> <x> <y> <z>
spawner list [group <name> | near <world> <x> <y> <z> <radius>]
spawner set <world> <x> <y> <z> <property> <value...>
    properties: visible true|false, mode 0|1|2, group <name|none>,
    capacity <n|none>, detection <r|none>, time <any|from-to>,
    weather <any|clear|rain>, radius <x y z>, name <text|none>
spawner templates
cancel                                   abort your open session";

/// Process one line of operator input and produce the reply text.
pub fn dispatch(ctx: &mut CommandContext, operator: &str, line: &str) -> String {
    let line = line.trim();
    if line.is_empty() {
        return String::new();
    }

    // An open session captures all input for its operator.
    if ctx.sessions.has(operator) {
        return match ctx.sessions.handle(operator, line, ctx.catalog, ctx.now_tick) {
            Some(SessionReply::Prompt(prompt)) => prompt,
            Some(SessionReply::Cancelled(msg)) => msg,
            Some(SessionReply::Committed(payload)) => {
                if let Err(problems) = codec::validate(&payload.entries, ctx.catalog) {
                    return format!("Refusing to commit: {}", problems.join("; "));
                }
                let id = ctx.registry.create_or_update(
                    payload.anchor,
                    payload.entries,
                    payload.props,
                    true,
                    DisplayMode::default(),
                );
                if let Some(ctrl) = ctx.registry.get(&id) {
                    ctrl.refresh_label(ctx.display);
                }
                persist_all(ctx);
                format!("Spawner {id} installed")
            }
            None => String::new(),
        };
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.as_slice() {
        ["help"] => HELP.to_string(),
        ["spawner", rest @ ..] => spawner_command(ctx, operator, rest),
        _ => format!("Unknown command '{line}'; try 'help'"),
    }
}

fn spawner_command(ctx: &mut CommandContext, operator: &str, args: &[&str]) -> String {
    match args {
        ["create", coords @ ..] => match parse_pos(coords) {
            Ok(anchor) => ctx.sessions.begin(operator, anchor, ctx.now_tick),
            Err(e) => e,
        },
        ["template", name, coords @ ..] => match parse_pos(coords) {
            Ok(anchor) => match ctx.registry.create_from_template(anchor, name, ctx.catalog) {
                Ok(id) => {
                    if let Some(ctrl) = ctx.registry.get(&id) {
                        ctrl.refresh_label(ctx.display);
                    }
                    persist_all(ctx);
                    format!("Spawner {id} installed from template '{name}'")
                }
                Err(e) => e,
            },
            Err(e) => e,
        },
        ["remove", coords @ ..] => match parse_pos(coords) {
            Ok(anchor) => {
                let Some(id) = ctx.registry.controller_at(&anchor).map(|c| c.id().clone()) else {
                    return format!("No spawner at {anchor}");
                };
                let _ = ctx.registry.remove(&id, ctx.display);
                if let Some(saver) = ctx.saver {
                    saver.send(SaveJob::Remove(anchor.storage_key()));
                }
                format!("Spawner {id} removed")
            }
            Err(e) => e,
        },
        ["reset", coords @ ..] => match parse_pos(coords) {
            Ok(anchor) => match ctx.registry.controller_at_mut(&anchor) {
                Some(ctrl) => {
                    ctrl.reset(ctx.display);
                    format!("Spawner {} reset", ctrl.id())
                }
                None => format!("No spawner at {anchor}"),
            },
            Err(e) => e,
        },
        ["info", coords @ ..] => match parse_pos(coords) {
            Ok(anchor) => {
                let defaults = *ctx.registry.defaults();
                match ctx.registry.controller_at(&anchor) {
                    Some(ctrl) => ctrl.info_text(&defaults),
                    None => format!("No spawner at {anchor}"),
                }
            }
            Err(e) => e,
        },
        ["list"] => {
            let defaults = *ctx.registry.defaults();
            let mut lines: Vec<String> = ctx
                .registry
                .ids()
                .iter()
                .filter_map(|id| ctx.registry.get(id))
                .map(|c| c.status_line(&defaults))
                .collect();
            lines.sort();
            if lines.is_empty() {
                "No spawners registered".to_string()
            } else {
                lines.join("\n")
            }
        }
        ["list", "group", name] => {
            ctx.registry.rebuild_groups();
            let defaults = *ctx.registry.defaults();
            let lines: Vec<String> = ctx
                .registry
                .group_members(name)
                .to_vec()
                .iter()
                .filter_map(|id| ctx.registry.get(id))
                .map(|c| c.status_line(&defaults))
                .collect();
            if lines.is_empty() {
                format!("No spawners in group '{name}'")
            } else {
                lines.join("\n")
            }
        }
        ["list", "near", coords_and_radius @ ..] if coords_and_radius.len() == 5 => {
            let Ok(anchor) = parse_pos(&coords_and_radius[..4]) else {
                return "Usage: spawner list near <world> <x> <y> <z> <radius>".to_string();
            };
            let Ok(radius) = coords_and_radius[4].parse::<f64>() else {
                return "Usage: spawner list near <world> <x> <y> <z> <radius>".to_string();
            };
            let defaults = *ctx.registry.defaults();
            let lines: Vec<String> = ctx
                .registry
                .near(&anchor, radius)
                .iter()
                .map(|c| c.status_line(&defaults))
                .collect();
            if lines.is_empty() {
                format!("No spawners within {radius:.0} of {anchor}")
            } else {
                lines.join("\n")
            }
        }
        ["templates"] => registry::TEMPLATES
            .iter()
            .map(|(name, data)| format!("{name}: {data}"))
            .collect::<Vec<_>>()
            .join("\n"),
        ["set", rest @ ..] if rest.len() >= 5 => {
            let Ok(anchor) = parse_pos(&rest[..4]) else {
                return "Usage: spawner set <world> <x> <y> <z> <property> <value...>".to_string();
            };
            let reply = set_property(ctx, &anchor, rest[4], &rest[5..]);
            persist_all(ctx);
            reply
        }
        _ => "Unknown spawner subcommand; try 'help'".to_string(),
    }
}

fn set_property(
    ctx: &mut CommandContext,
    anchor: &BlockPos,
    property: &str,
    args: &[&str],
) -> String {
    // Split borrows: the display collaborator is needed by some setters
    // while the controller is mutably borrowed.
    let display = &mut *ctx.display;
    let Some(ctrl) = ctx.registry.controller_at_mut(anchor) else {
        return format!("No spawner at {anchor}");
    };
    match (property, args) {
        ("visible", ["true"]) => {
            ctrl.set_visible(true, display);
            "Visibility on".to_string()
        }
        ("visible", ["false"]) => {
            ctrl.set_visible(false, display);
            "Visibility off".to_string()
        }
        ("mode", [value]) => match value.parse::<u8>().ok().and_then(DisplayMode::from_u8) {
            Some(mode) => {
                ctrl.set_display_mode(mode, display);
                format!("Display mode set to {mode:?}")
            }
            None => "Usage: mode 0|1|2".to_string(),
        },
        ("group", ["none"]) => {
            ctrl.set_group(None);
            "Group cleared".to_string()
        }
        ("group", [name]) => {
            ctrl.set_group(Some((*name).to_string()));
            format!("Group set to '{name}'")
        }
        ("capacity", ["none"]) => {
            ctrl.set_capacity_override(None);
            "Capacity override cleared".to_string()
        }
        ("capacity", [value]) => match value.parse::<u16>() {
            Ok(cap) if cap >= 1 => {
                ctrl.set_capacity_override(Some(cap));
                format!("Capacity override set to {cap}")
            }
            _ => "Usage: capacity <n|none>".to_string(),
        },
        ("detection", ["none"]) => {
            ctrl.set_detection_radius_override(None);
            "Detection override cleared".to_string()
        }
        ("detection", [value]) => match value.parse::<f64>() {
            Ok(r) if r > 0.0 => {
                ctrl.set_detection_radius_override(Some(r));
                format!("Detection radius set to {r:.1}")
            }
            _ => "Usage: detection <r|none>".to_string(),
        },
        ("time", ["any"]) => {
            ctrl.set_time_restriction(TimeRestriction::Any);
            "Time restriction cleared".to_string()
        }
        ("time", [window]) => match parse_hour_window(window) {
            Some((from_hour, to_hour)) => {
                ctrl.set_time_restriction(TimeRestriction::Window { from_hour, to_hour });
                format!("Time window set to {from_hour}-{to_hour}")
            }
            None => "Usage: time <any|from-to> with hours 0-23".to_string(),
        },
        ("weather", [value]) => {
            let restriction = match *value {
                "any" => WeatherRestriction::Any,
                "clear" => WeatherRestriction::RequireClear,
                "rain" => WeatherRestriction::RequireRain,
                _ => return "Usage: weather <any|clear|rain>".to_string(),
            };
            ctrl.set_weather_restriction(restriction);
            format!("Weather restriction set to {value}")
        }
        ("radius", [x, y, z]) => {
            match (x.parse::<f64>(), y.parse::<f64>(), z.parse::<f64>()) {
                (Ok(x), Ok(y), Ok(z)) if x >= 0.0 && y >= 0.0 && z >= 0.0 => {
                    ctrl.set_spawn_radius(SpawnRadius { x, y, z });
                    format!("Spawn radius set to {x} {y} {z}")
                }
                _ => "Usage: radius <x> <y> <z>".to_string(),
            }
        }
        ("name", ["none"]) => {
            ctrl.set_display_name(None, display);
            "Display name cleared".to_string()
        }
        ("name", words) if !words.is_empty() => {
            let name = words.join(" ");
            ctrl.set_display_name(Some(name.clone()), display);
            format!("Display name set to '{name}'")
        }
        _ => format!("Unknown property '{property}'; try 'help'"),
    }
}

fn parse_pos(args: &[&str]) -> Result<BlockPos, String> {
    match args {
        [world, x, y, z] => {
            let x = x
                .parse::<i32>()
                .map_err(|_| format!("'{x}' is not a coordinate"))?;
            let y = y
                .parse::<i32>()
                .map_err(|_| format!("'{y}' is not a coordinate"))?;
            let z = z
                .parse::<i32>()
                .map_err(|_| format!("'{z}' is not a coordinate"))?;
            Ok(BlockPos::new(*world, x, y, z))
        }
        _ => Err("Expected <world> <x> <y> <z>".to_string()),
    }
}

fn persist_all(ctx: &mut CommandContext) {
    if let Some(saver) = ctx.saver {
        saver.send(SaveJob::Snapshots(ctx.registry.snapshots()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Defaults;
    use crate::testutil::RecordingDisplay;
    use spawnkeep_core::species::StockCatalog;

    struct Harness {
        registry: SpawnRegistry,
        sessions: SessionManager,
        display: RecordingDisplay,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                registry: SpawnRegistry::new(Defaults {
                    capacity: 10,
                    detection_radius: 32.0,
                }),
                sessions: SessionManager::new(),
                display: RecordingDisplay::default(),
            }
        }

        fn run(&mut self, operator: &str, line: &str) -> String {
            let mut ctx = CommandContext {
                registry: &mut self.registry,
                sessions: &mut self.sessions,
                catalog: &StockCatalog,
                display: &mut self.display,
                saver: None,
                now_tick: 0,
            };
            dispatch(&mut ctx, operator, line)
        }
    }

    /// Create-session flow end to end: the controller exists only after
    /// the final confirm.
    #[test]
    fn create_session_commits_controller() {
        let mut h = Harness::new();
        let _ = h.run("alex", "spawner create overworld 10 64 -3");
        assert!(h.sessions.has("alex"));

        for input in ["skeleton", "3", "false", "2", "done"] {
            let _ = h.run("alex", input);
            assert!(h.registry.is_empty(), "committed early at '{input}'");
        }
        let reply = h.run("alex", "confirm");
        assert!(reply.contains("installed"), "{reply}");
        assert!(!h.sessions.has("alex"));
        assert_eq!(h.registry.len(), 1);
        let ctrl = h
            .registry
            .controller_at(&BlockPos::new("overworld", 10, 64, -3))
            .unwrap();
        assert_eq!(ctrl.desired_total(), 2);
    }

    /// Cancelling mid-session leaves no controller behind.
    #[test]
    fn cancelled_session_applies_nothing() {
        let mut h = Harness::new();
        let _ = h.run("alex", "spawner create overworld 0 64 0");
        let _ = h.run("alex", "zombie");
        let _ = h.run("alex", "2");
        let reply = h.run("alex", "cancel");
        assert!(reply.contains("cancelled"), "{reply}");
        assert!(h.registry.is_empty());
        assert!(!h.sessions.has("alex"));
    }

    /// Two operators run independent sessions.
    #[test]
    fn sessions_are_per_operator() {
        let mut h = Harness::new();
        let _ = h.run("alex", "spawner create overworld 0 64 0");
        let _ = h.run("blair", "spawner create overworld 50 64 0");
        let _ = h.run("alex", "zombie");
        let _ = h.run("blair", "skeleton");
        let _ = h.run("alex", "cancel");
        assert!(!h.sessions.has("alex"));
        assert!(h.sessions.has("blair"));
    }

    #[test]
    fn template_command_installs_directly() {
        let mut h = Harness::new();
        let reply = h.run("alex", "spawner template spider_nest overworld 1 60 1");
        assert!(reply.contains("installed"), "{reply}");
        assert_eq!(h.registry.len(), 1);
        let reply = h.run("alex", "spawner template bogus overworld 2 60 1");
        assert!(reply.contains("unknown template"), "{reply}");
    }

    #[test]
    fn set_and_info_round_trip() {
        let mut h = Harness::new();
        let _ = h.run("alex", "spawner template graveyard overworld 0 64 0");

        let reply = h.run("alex", "spawner set overworld 0 64 0 group crypt");
        assert!(reply.contains("crypt"), "{reply}");
        let reply = h.run("alex", "spawner set overworld 0 64 0 time 20-6");
        assert!(reply.contains("20-6"), "{reply}");
        let reply = h.run("alex", "spawner set overworld 0 64 0 capacity 12");
        assert!(reply.contains("12"), "{reply}");

        let info = h.run("alex", "spawner info overworld 0 64 0");
        assert!(info.contains("group: crypt"), "{info}");
        assert!(info.contains("capacity: 12"), "{info}");

        let listed = h.run("alex", "spawner list group crypt");
        assert!(listed.contains("overworld_0_64_0"), "{listed}");
    }

    #[test]
    fn visibility_drives_display_labels() {
        let mut h = Harness::new();
        let _ = h.run("alex", "spawner template graveyard overworld 0 64 0");
        assert!(h.display.labels.contains_key("overworld_0_64_0"));

        let _ = h.run("alex", "spawner set overworld 0 64 0 visible false");
        assert!(!h.display.labels.contains_key("overworld_0_64_0"));

        let _ = h.run("alex", "spawner set overworld 0 64 0 visible true");
        assert!(h.display.labels.contains_key("overworld_0_64_0"));
    }

    #[test]
    fn remove_command_deletes_controller() {
        let mut h = Harness::new();
        let _ = h.run("alex", "spawner template graveyard overworld 0 64 0");
        let reply = h.run("alex", "spawner remove overworld 0 64 0");
        assert!(reply.contains("removed"), "{reply}");
        assert!(h.registry.is_empty());
        let reply = h.run("alex", "spawner remove overworld 0 64 0");
        assert!(reply.contains("No spawner"), "{reply}");
    }

    #[test]
    fn malformed_input_gets_usage_replies() {
        let mut h = Harness::new();
        assert!(h.run("alex", "frobnicate").contains("Unknown command"));
        assert!(h
            .run("alex", "spawner create overworld x y z")
            .contains("not a coordinate"));
        assert!(h.run("alex", "spawner info overworld 0 64 0").contains("No spawner"));
    }
}
