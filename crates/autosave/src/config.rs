// Local configuration for draftkeep.
//
// Global config: `~/.draftkeep/config.toml`
//
// The remote auth token is never read from this file; it comes from the
// `DRAFTKEEP_TOKEN` environment variable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable holding the bearer token for the remote store.
pub const TOKEN_ENV_VAR: &str = "DRAFTKEEP_TOKEN";

/// Root directory for draftkeep global state: `~/.draftkeep/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".draftkeep"))
}

/// Path to the global config file: `~/.draftkeep/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

// ── Config file ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub autosave: AutosaveConfig,
    pub remote: RemoteConfig,
}

impl Config {
    /// Load from `~/.draftkeep/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Save to `~/.draftkeep/config.toml`.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = global_config_path().ok_or(ConfigError::NoHomeDir)?;
        self.save_to(&path)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Timing knobs for the autosave controller, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Quiet period after the last edit before a save is dispatched.
    pub debounce_ms: u64,
    /// Automatic retries after the first failed attempt.
    pub retry_limit: u32,
    /// Fixed delay before each retry.
    pub retry_backoff_ms: u64,
    /// Upper bound on how long close waits for an in-flight save.
    pub close_wait_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self { debounce_ms: 800, retry_limit: 2, retry_backoff_ms: 1000, close_wait_ms: 5000 }
    }
}

impl AutosaveConfig {
    pub fn policy(&self) -> AutosavePolicy {
        AutosavePolicy {
            debounce: Duration::from_millis(self.debounce_ms),
            retry_limit: self.retry_limit,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            close_wait: Duration::from_millis(self.close_wait_ms),
        }
    }
}

/// Remote document service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
    /// Base URL of the document API (e.g. `https://api.example.com/v1/`).
    pub base_url: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self { base_url: None, request_timeout_ms: 10_000 }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// ── Runtime policy ─────────────────────────────────────────────────

/// Resolved timing policy handed to an editing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosavePolicy {
    pub debounce: Duration,
    pub retry_limit: u32,
    pub retry_backoff: Duration,
    pub close_wait: Duration,
}

impl Default for AutosavePolicy {
    fn default() -> Self {
        AutosaveConfig::default().policy()
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("could not determine home directory")]
    NoHomeDir,
}
