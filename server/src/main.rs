use std::env;
use std::io::BufRead;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::LevelFilter;

use spawnkeep_core::constants::{
    DEFAULT_CAPACITY, DEFAULT_DETECTION_RADIUS, SAVE_INTERVAL_TICKS, TICK,
};
use spawnkeep_core::species::StockCatalog;
use spawnkeep_core::types::UnitHandle;

use spawnkeep_server::background_saver::{self, SaveJob};
use spawnkeep_server::commands::{self, CommandContext};
use spawnkeep_server::controller::Defaults;
use spawnkeep_server::events::ServiceMessage;
use spawnkeep_server::keydb;
use spawnkeep_server::registry::SpawnRegistry;
use spawnkeep_server::session::SessionManager;
use spawnkeep_server::snapshot;
use spawnkeep_server::world::{new_ledger, LogDisplay, StandaloneFactory, StandaloneWorld, TieredDelays};

/// Get current time in microseconds
fn timel() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

fn main() {
    dotenvy::dotenv().ok();

    let log_file = env::var("SPAWND_LOG_FILE").ok();
    spawnkeep_core::initialize_logger(LevelFilter::Info, log_file.as_deref()).unwrap_or_else(
        |e| {
            eprintln!("Failed to initialize logger: {}. Exiting.", e);
            process::exit(1);
        },
    );

    log::info!("Starting spawnkeep server v0.3.0");

    let quit_flag = Arc::new(AtomicBool::new(false));
    let quit_flag_clone = quit_flag.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if quit_flag_clone.swap(true, Ordering::SeqCst) {
            log::info!("Alright, alright, I'm already terminating!");
        } else {
            log::info!("Got signal to terminate. Shutdown initiated...");
        }
    }) {
        log::error!("Failed to install signal handler: {e}. Exiting.");
        process::exit(1);
    }

    let catalog = StockCatalog;
    let mut registry = SpawnRegistry::new(Defaults {
        capacity: DEFAULT_CAPACITY,
        detection_radius: DEFAULT_DETECTION_RADIUS,
    });

    // Load persisted controllers. A dead store is not fatal: the service
    // starts empty and the background saver keeps retrying.
    match keydb::connect() {
        Ok(mut con) => match snapshot::load_all(&mut con) {
            Ok(snapshots) => {
                let loaded = registry.load(snapshots, &catalog);
                log::info!("Loaded {loaded} spawner(s) from KeyDB");
            }
            Err(e) => log::error!("Snapshot load failed, starting empty: {e}"),
        },
        Err(e) => log::warn!("KeyDB unavailable at startup, starting empty: {e}"),
    }

    let saver = background_saver::spawn();
    let mut sessions = SessionManager::new();

    let ledger = new_ledger();
    let world = StandaloneWorld::new(ledger.clone());
    let mut factory = StandaloneFactory::new(ledger.clone());
    let mut display = LogDisplay;
    let delays = TieredDelays;

    // Console reader: one line per command, replies printed in order.
    let (console_tx, rx) = mpsc::channel::<ServiceMessage>();
    std::thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let (reply_tx, reply_rx) = mpsc::channel();
                if console_tx
                    .send(ServiceMessage::Command {
                        operator: "console".to_string(),
                        line,
                        reply: reply_tx,
                    })
                    .is_err()
                {
                    break;
                }
                if let Ok(reply) = reply_rx.recv() {
                    if !reply.is_empty() {
                        println!("{reply}");
                    }
                }
            }
        })
        .expect("Failed to spawn console thread");

    log::info!("Entering main tick loop...");

    let mut ticker: u64 = 0;
    let mut ltime = timel();

    while !quit_flag.load(Ordering::SeqCst) {
        let ttime = timel();
        if ttime < ltime {
            std::thread::sleep(Duration::from_micros((ltime - ttime) as u64));
            continue;
        }
        ltime += TICK;
        ticker += 1;

        // Drain queued world events and operator input into this, the
        // single mutation context.
        while let Ok(msg) = rx.try_recv() {
            match msg {
                ServiceMessage::UnitDied(handle) => {
                    let _ = registry.on_unit_died(handle, &delays, ticker);
                }
                ServiceMessage::Command {
                    operator,
                    line,
                    reply,
                } => {
                    // Debug hook for console operation: kill a live unit by
                    // handle, as the engine's death hook would.
                    let text = if let Some(arg) = line.strip_prefix("kill ") {
                        match arg.trim().trim_start_matches('#').parse::<u64>() {
                            Ok(id) => {
                                let handle = UnitHandle(id);
                                if ledger.borrow_mut().remove(handle)
                                    && registry.on_unit_died(handle, &delays, ticker)
                                {
                                    format!("Unit {handle} killed")
                                } else {
                                    format!("No live unit {handle}")
                                }
                            }
                            Err(_) => "Usage: kill <unit id>".to_string(),
                        }
                    } else {
                        let mut ctx = CommandContext {
                            registry: &mut registry,
                            sessions: &mut sessions,
                            catalog: &catalog,
                            display: &mut display,
                            saver: Some(&saver),
                            now_tick: ticker,
                        };
                        commands::dispatch(&mut ctx, &operator, &line)
                    };
                    let _ = reply.send(text);
                }
            }
        }

        let _ = registry.tick(ticker, &world, &mut factory, &delays, &mut display);
        let _ = sessions.evict_idle(ticker);

        if ticker % SAVE_INTERVAL_TICKS == 0 && !registry.is_empty() {
            saver.send(SaveJob::Snapshots(registry.snapshots()));
        }
    }

    // Clean shutdown: push a final snapshot and wait for the saver to
    // drain before exiting.
    log::info!("Shutting down...");
    saver.send(SaveJob::Snapshots(registry.snapshots()));
    if let Err(e) = saver.flush() {
        log::error!("Final snapshot flush failed: {e}");
    }
    drop(saver);

    log::info!("Server shutdown complete.");
}
