//! Client configuration: endpoints, intervals and fetch limits.
//!
//! Resolution order: built-in defaults, then `~/.sadaqah/config.json` when
//! present, then `SADAQAH_API_BASE_URL` / `SADAQAH_WS_BASE_URL`. The CLI may
//! override individual fields on top of that.

use std::time::Duration;

use fs_err as fs;
use sadaqah_protocol::LIVE_PATH;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::backoff::BackoffPolicy;
use crate::error::{LiveError, Result};
use crate::storage::StorageConfig;

pub const API_BASE_ENV: &str = "SADAQAH_API_BASE_URL";
pub const WS_BASE_ENV: &str = "SADAQAH_WS_BASE_URL";
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub api_base_url: String,
    /// Explicit live-update socket URL; derived from `api_base_url` when unset.
    pub ws_url: Option<String>,
    pub request_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub reminder_interval_ms: u64,
    pub profile_debounce_ms: u64,
    pub activity_limit: u32,
    pub history_limit: u32,
    pub backoff: BackoffPolicy,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ws_url: None,
            request_timeout_ms: 12_000,
            poll_interval_ms: 10_000,
            reminder_interval_ms: 60_000,
            profile_debounce_ms: 500,
            activity_limit: 35,
            history_limit: 24,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl LiveConfig {
    /// Loads the config file, returning defaults if it is missing or corrupt,
    /// then applies environment overrides.
    pub fn load(storage: &StorageConfig) -> Self {
        let path = storage.config_file();
        let from_file = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<LiveConfig>(&content) {
                Ok(config) => config,
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "Config file malformed; using defaults"
                    );
                    LiveConfig::default()
                }
            },
            Err(_) => LiveConfig::default(),
        };
        from_file.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `SADAQAH_*` overrides through `lookup` so tests never touch
    /// the process environment.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup(API_BASE_ENV).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = value.trim().to_string();
        }
        if let Some(value) = lookup(WS_BASE_ENV).filter(|v| !v.trim().is_empty()) {
            self.ws_url = Some(value.trim().to_string());
        }
        self
    }

    /// Rejects values that would make the controller spin or never fire.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.api_base_url).map_err(|err| LiveError::InvalidUrl {
            url: self.api_base_url.clone(),
            reason: err.to_string(),
        })?;
        for (name, value) in [
            ("request_timeout_ms", self.request_timeout_ms),
            ("poll_interval_ms", self.poll_interval_ms),
            ("reminder_interval_ms", self.reminder_interval_ms),
        ] {
            if value == 0 {
                return Err(LiveError::InvalidInput(format!("{} must be positive", name)));
            }
        }
        self.backoff.validate()
    }

    /// The live-update socket URL.
    ///
    /// Returned as a string: a malformed explicit override is still handed
    /// to the push channel, which treats it as an immediate close.
    pub fn live_ws_url(&self) -> String {
        if let Some(explicit) = &self.ws_url {
            return explicit.clone();
        }
        match derive_ws_url(&self.api_base_url) {
            Ok(url) => url.to_string(),
            Err(err) => {
                warn!(error = %err, "Could not derive live URL from API base");
                self.api_base_url.clone()
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reminder_interval(&self) -> Duration {
        Duration::from_millis(self.reminder_interval_ms)
    }

    pub fn profile_debounce(&self) -> Duration {
        Duration::from_millis(self.profile_debounce_ms)
    }
}

/// `http(s)://host/api` → `ws(s)://host/ws/live/`, dropping query and fragment.
pub fn derive_ws_url(api_base_url: &str) -> Result<Url> {
    let mut url = Url::parse(api_base_url).map_err(|err| LiveError::InvalidUrl {
        url: api_base_url.to_string(),
        reason: err.to_string(),
    })?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme).map_err(|_| LiveError::InvalidUrl {
        url: api_base_url.to_string(),
        reason: "cannot switch to a WebSocket scheme".to_string(),
    })?;
    url.set_path(LIVE_PATH);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
