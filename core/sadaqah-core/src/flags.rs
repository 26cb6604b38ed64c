//! Durable best-effort key/value store for small client flags.
//!
//! Holds the notification toggle and the map of reminders that were already
//! notified. Nothing here returns an error: a failed read yields the default,
//! a failed write is logged and forgotten. Callers must not assume success.
//!
//! # File Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "flags": {
//!     "sadaqah_notifications_enabled": "true",
//!     "sadaqah_notified_reminders": "{\"4-12-2026-03-01T10:00:00+00:00\":true}"
//!   }
//! }
//! ```
//!
//! Values are strings so the store stays a plain `{get, set}` capability;
//! typed access goes through [`read_bool`] / [`read_json`].

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use fs_err as fs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

pub const NOTIFICATIONS_ENABLED_KEY: &str = "sadaqah_notifications_enabled";
pub const NOTIFIED_REMINDERS_KEY: &str = "sadaqah_notified_reminders";

const FILE_VERSION: u32 = 1;

/// Best-effort string key/value capability.
pub trait FlagStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

pub fn read_bool(store: &dyn FlagStore, key: &str, default: bool) -> bool {
    match store.get(key) {
        Some(value) => value == "true",
        None => default,
    }
}

pub fn write_bool(store: &dyn FlagStore, key: &str, value: bool) {
    store.set(key, if value { "true" } else { "false" });
}

pub fn read_json<T: DeserializeOwned>(store: &dyn FlagStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, error = %err, "Ignoring unreadable flag value");
            None
        }
    }
}

pub fn write_json<T: Serialize>(store: &dyn FlagStore, key: &str, value: &T) {
    match serde_json::to_string(value) {
        Ok(raw) => store.set(key, &raw),
        Err(err) => warn!(key, error = %err, "Failed to serialize flag value"),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-memory store
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct MemoryFlagStore {
    flags: Mutex<HashMap<String, String>>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates external storage clearance (browser "clear site data").
    pub fn clear(&self) {
        lock(&self.flags).clear();
    }
}

impl FlagStore for MemoryFlagStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.flags).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        lock(&self.flags).insert(key.to_string(), value.to_string());
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// File-backed store
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize, Deserialize)]
struct FlagFile {
    version: u32,
    #[serde(default)]
    flags: BTreeMap<String, String>,
}

/// Flags cached in memory and written through to a JSON file.
///
/// Writes use temp file + rename so a crash mid-write leaves the previous
/// file intact. `set` blocks on disk I/O; async callers on a hot path should
/// go through `spawn_blocking`.
#[derive(Debug)]
pub struct FileFlagStore {
    path: PathBuf,
    flags: Mutex<BTreeMap<String, String>>,
}

impl FileFlagStore {
    /// Opens the store. Missing, empty or corrupt files yield an empty store.
    pub fn open(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            flags: Mutex::new(load_flags(path)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, flags: &BTreeMap<String, String>) -> Result<(), String> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| "Flag file has no parent directory".to_string())?;
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create flag dir: {}", e))?;

        let file = FlagFile {
            version: FILE_VERSION,
            flags: flags.clone(),
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| format!("Failed to serialize flags: {}", e))?;

        let mut temp = NamedTempFile::new_in(parent)
            .map_err(|e| format!("Failed to create temp flag file: {}", e))?;
        temp.write_all(content.as_bytes())
            .map_err(|e| format!("Failed to write temp flag file: {}", e))?;
        temp.persist(&self.path)
            .map_err(|e| format!("Failed to commit flag file: {}", e))?;
        Ok(())
    }
}

impl FlagStore for FileFlagStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.flags).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut flags = lock(&self.flags);
        if flags.get(key).map(String::as_str) == Some(value) {
            return;
        }
        flags.insert(key.to_string(), value.to_string());
        if let Err(err) = self.persist(&flags) {
            warn!(path = %self.path.display(), key, error = %err, "Flag write failed");
        }
    }
}

fn load_flags(path: &Path) -> BTreeMap<String, String> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to read flag file");
            return BTreeMap::new();
        }
    };

    if content.trim().is_empty() {
        return BTreeMap::new();
    }

    match serde_json::from_str::<FlagFile>(&content) {
        Ok(file) if file.version == FILE_VERSION => file.flags,
        Ok(file) => {
            warn!(
                path = %path.display(),
                version = file.version,
                "Unsupported flag file version, starting empty"
            );
            BTreeMap::new()
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Corrupt flag file, starting empty");
            BTreeMap::new()
        }
    }
}
