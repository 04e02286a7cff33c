//! KeyDB-backed snapshot store for controller state.
//!
//! Key schema:
//! - `spawner:{world},{x},{y},{z}` — one hash per controller with fields
//!   `data` (entry string), `visible` (0/1), `display_mode` (0-2) and
//!   `props` (bincode `ControllerProperties`)
//! - `spawner:index`               — set of all `{world},{x},{y},{z}` keys
//! - `spawner:meta:version`        — schema version integer
//!
//! Legacy compatibility: schema v1 stored the entry string directly as a
//! string value at the controller key. Those records are still read and
//! get default properties; the next save rewrites them as hashes.

use std::collections::HashMap;

use bincode::{Decode, Encode};
use redis::{pipe, Commands, Connection};

use spawnkeep_core::constants::{BACKUP_FILE, SCHEMA_VERSION};
use spawnkeep_core::types::ControllerProperties;

use crate::controller::PopulationController;

const KEY_PREFIX: &str = "spawner:";
const INDEX_KEY: &str = "spawner:index";
const META_VERSION_KEY: &str = "spawner:meta:version";

/// Point-in-time copy of one controller's persisted state. `key` is the
/// storage key component, `{world},{x},{y},{z}`.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct ControllerSnapshot {
    pub key: String,
    pub data: String,
    pub visible: bool,
    pub display_mode: u8,
    pub props: ControllerProperties,
}

impl ControllerSnapshot {
    pub fn capture(controller: &PopulationController) -> Self {
        Self {
            key: controller.anchor().storage_key(),
            data: spawnkeep_core::codec::serialize_population(controller.entries()),
            visible: controller.visible(),
            display_mode: controller.display_mode() as u8,
            props: controller.props().clone(),
        }
    }

    fn redis_key(&self) -> String {
        format!("{KEY_PREFIX}{}", self.key)
    }

    /// The hash fields written for this snapshot.
    fn field_pairs(&self) -> Result<Vec<(&'static str, Vec<u8>)>, String> {
        let props = bincode::encode_to_vec(&self.props, bincode::config::standard())
            .map_err(|e| format!("Encode props for {}: {e}", self.key))?;
        Ok(vec![
            ("data", self.data.clone().into_bytes()),
            ("visible", if self.visible { b"1".to_vec() } else { b"0".to_vec() }),
            ("display_mode", self.display_mode.to_string().into_bytes()),
            ("props", props),
        ])
    }

    /// Rebuild a snapshot from a loaded hash. A missing `props` field is
    /// tolerated (older v2 writes) and yields defaults.
    fn from_hash(key: &str, fields: HashMap<String, Vec<u8>>) -> Result<Self, String> {
        let data = fields
            .get("data")
            .ok_or_else(|| format!("{key}: hash has no data field"))
            .and_then(|raw| {
                String::from_utf8(raw.clone()).map_err(|_| format!("{key}: data is not UTF-8"))
            })?;
        let visible = fields.get("visible").map(|v| v.as_slice() == b"1").unwrap_or(true);
        let display_mode = fields
            .get("display_mode")
            .and_then(|v| std::str::from_utf8(v).ok())
            .and_then(|v| v.parse::<u8>().ok())
            .unwrap_or(2);
        let props = match fields.get("props") {
            Some(raw) => {
                let (props, _) =
                    bincode::decode_from_slice(raw, bincode::config::standard())
                        .map_err(|e| format!("{key}: props decode failed: {e}"))?;
                props
            }
            None => ControllerProperties::default(),
        };
        Ok(Self {
            key: key.to_string(),
            data,
            visible,
            display_mode,
            props,
        })
    }

    /// Schema v1 record: the entry string stored directly at the key.
    fn from_legacy(key: &str, raw: &str) -> Self {
        Self {
            key: key.to_string(),
            data: raw.to_string(),
            visible: true,
            display_mode: 2,
            props: ControllerProperties::default(),
        }
    }
}

/// Check whether any snapshot data has been written yet.
pub fn has_data(con: &mut Connection) -> Result<bool, String> {
    let exists: bool = con
        .exists(META_VERSION_KEY)
        .map_err(|e| format!("KeyDB exists check failed: {e}"))?;
    Ok(exists)
}

/// Load every controller snapshot. Prefers the index set; falls back to a
/// keyspace scan for stores written before the index existed.
pub fn load_all(con: &mut Connection) -> Result<Vec<ControllerSnapshot>, String> {
    let mut keys: Vec<String> = con
        .smembers(INDEX_KEY)
        .map_err(|e| format!("KeyDB SMEMBERS {INDEX_KEY} failed: {e}"))?;
    if keys.is_empty() {
        keys = scan_keys(con)?;
    }
    keys.sort();

    let mut snapshots = Vec::with_capacity(keys.len());
    for key in keys {
        match load_one(con, &key)? {
            Some(snap) => snapshots.push(snap),
            None => log::warn!("index lists {key} but no record exists"),
        }
    }
    Ok(snapshots)
}

/// Load a single snapshot by storage key, handling both the hash format
/// and the legacy plain-string format.
pub fn load_one(con: &mut Connection, key: &str) -> Result<Option<ControllerSnapshot>, String> {
    let redis_key = format!("{KEY_PREFIX}{key}");
    let kind: String = redis::cmd("TYPE")
        .arg(&redis_key)
        .query(con)
        .map_err(|e| format!("KeyDB TYPE {redis_key} failed: {e}"))?;
    match kind.as_str() {
        "hash" => {
            let fields: HashMap<String, Vec<u8>> = con
                .hgetall(&redis_key)
                .map_err(|e| format!("KeyDB HGETALL {redis_key} failed: {e}"))?;
            ControllerSnapshot::from_hash(key, fields).map(Some)
        }
        "string" => {
            let raw: String = con
                .get(&redis_key)
                .map_err(|e| format!("KeyDB GET {redis_key} failed: {e}"))?;
            log::info!("read legacy record for {key}; will rewrite as hash on next save");
            Ok(Some(ControllerSnapshot::from_legacy(key, &raw)))
        }
        "none" => Ok(None),
        other => Err(format!("{redis_key}: unexpected value type '{other}'")),
    }
}

/// Write every snapshot and rebuild the index in one pipeline. Each key is
/// deleted first so legacy string records migrate to hashes cleanly.
pub fn save_all(con: &mut Connection, snapshots: &[ControllerSnapshot]) -> Result<(), String> {
    let mut pipeline = pipe();
    for snap in snapshots {
        let redis_key = snap.redis_key();
        pipeline.cmd("DEL").arg(&redis_key).ignore();
        let mut cmd = pipeline.cmd("HSET");
        cmd.arg(&redis_key);
        for (field, value) in snap.field_pairs()? {
            cmd.arg(field).arg(value);
        }
        cmd.ignore();
        pipeline.cmd("SADD").arg(INDEX_KEY).arg(&snap.key).ignore();
    }
    pipeline
        .cmd("SET")
        .arg(META_VERSION_KEY)
        .arg(SCHEMA_VERSION)
        .ignore();
    pipeline
        .query::<()>(con)
        .map_err(|e| format!("KeyDB snapshot save failed: {e}"))
}

/// Remove one controller record and its index entry.
pub fn delete(con: &mut Connection, key: &str) -> Result<(), String> {
    let redis_key = format!("{KEY_PREFIX}{key}");
    let mut pipeline = pipe();
    pipeline.cmd("DEL").arg(&redis_key).ignore();
    pipeline.cmd("SREM").arg(INDEX_KEY).arg(key).ignore();
    pipeline
        .query::<()>(con)
        .map_err(|e| format!("KeyDB delete {redis_key} failed: {e}"))
}

fn scan_keys(con: &mut Connection) -> Result<Vec<String>, String> {
    let mut keys = Vec::new();
    let mut cursor: u64 = 0;
    loop {
        let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(format!("{KEY_PREFIX}*"))
            .arg("COUNT")
            .arg(64)
            .query(con)
            .map_err(|e| format!("KeyDB SCAN failed: {e}"))?;
        for full in batch {
            let key = &full[KEY_PREFIX.len()..];
            if key == "index" || key.starts_with("meta:") {
                continue;
            }
            keys.push(key.to_string());
        }
        cursor = next;
        if cursor == 0 {
            break;
        }
    }
    Ok(keys)
}

/// Dump all snapshots to a local file before a save retry, so a dead
/// store never costs the current state.
pub fn write_backup_file(snapshots: &[ControllerSnapshot]) -> Result<(), String> {
    let bytes = bincode::encode_to_vec(snapshots, bincode::config::standard())
        .map_err(|e| format!("Encode backup: {e}"))?;
    std::fs::write(BACKUP_FILE, bytes).map_err(|e| format!("Write {BACKUP_FILE}: {e}"))
}
