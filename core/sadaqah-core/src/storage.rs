//! Storage configuration and path management.
//!
//! Production code uses `StorageConfig::default()`, which points to
//! `~/.sadaqah/`. Tests use `StorageConfig::with_root(temp_dir)` for
//! isolation.

use std::path::{Path, PathBuf};

const ROOT_DIR_NAME: &str = ".sadaqah";

/// Central configuration for all on-disk client state.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for client data (default: ~/.sadaqah)
    root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // No home directory (service accounts, minimal containers): fall back
        // to the working directory rather than refusing to start.
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            root: home.join(ROOT_DIR_NAME),
        }
    }
}

impl StorageConfig {
    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to flags.json (notification toggle + already-notified map).
    pub fn flags_file(&self) -> PathBuf {
        self.root.join("flags.json")
    }

    /// Path to config.json (endpoint and interval overrides).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Path to logs/ (daily rolling log files of the headless client).
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}
