//! # Sync Configuration
//!
//! Static configuration for the replication engine. There are no runtime
//! flags: each build variant ships one configuration object.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SHOPKEEPER_SYNC_URLS=http://hub:5984,http://fallback:5984          │
//! │     SHOPKEEPER_SYNC_USERNAME=admin                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/shopkeeper/sync.toml (Linux)                             │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [remote]
//! candidate_urls = ["http://hub.local:5984", "http://backup.local:5984"]
//! username = "admin"
//! password = "secret"
//! probe_timeout_secs = 5
//!
//! [sync]
//! batch_size = 25
//! debounce_ms = 300
//! longpoll_timeout_secs = 25
//! settle_delay_secs = 2
//! ```
//!
//! The candidate list is ORDERED: discovery probes it front to back and the
//! first healthy endpoint wins.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Remote Settings
// =============================================================================

/// Where the remote replica may live and how to talk to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Candidate base URLs, in priority order.
    #[serde(default)]
    pub candidate_urls: Vec<String>,

    /// Basic-auth username, sent on every request.
    #[serde(default)]
    pub username: String,

    /// Basic-auth password, sent on every request.
    #[serde(default)]
    pub password: String,

    /// Health-probe timeout (seconds). A probe that exceeds this is a
    /// failure, not retried within the same discovery call.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            candidate_urls: Vec::new(),
            username: String::new(),
            password: String::new(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Replication behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Documents per push/pull batch. Both channels use the same bound.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Debounce window (milliseconds) between a replication event and the
    /// durable flush it schedules. A new event within the window cancels
    /// and reschedules the pending flush.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// How long one long-poll of the remote change feed may wait
    /// (seconds) before returning empty.
    #[serde(default = "default_longpoll_timeout")]
    pub longpoll_timeout_secs: u64,

    /// Settle delay (seconds) between deleting remote collections and
    /// recreating them, to accommodate the remote's eventual-deletion
    /// semantics.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            batch_size: default_batch_size(),
            debounce_ms: default_debounce_ms(),
            longpoll_timeout_secs: default_longpoll_timeout(),
            settle_delay_secs: default_settle_delay(),
        }
    }
}

fn default_probe_timeout() -> u64 {
    5
}
fn default_batch_size() -> usize {
    25
}
fn default_debounce_ms() -> u64 {
    300
}
fn default_longpoll_timeout() -> u64 {
    25
}
fn default_settle_delay() -> u64 {
    2
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Remote replica settings.
    #[serde(default)]
    pub remote: RemoteSettings,

    /// Replication behavior settings.
    #[serde(default)]
    pub sync: SyncSettings,
}

impl SyncConfig {
    /// Creates a config with defaults (empty candidate list).
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        for candidate in &self.remote.candidate_urls {
            let parsed = Url::parse(candidate)?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(SyncError::InvalidUrl(format!(
                    "Candidate URL must be http(s), got: {candidate}"
                )));
            }
        }

        if self.sync.batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "batch_size must be greater than 0".into(),
            ));
        }

        if self.remote.probe_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "probe_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // Candidate URLs, comma separated, in priority order
        if let Ok(urls) = std::env::var("SHOPKEEPER_SYNC_URLS") {
            let candidates: Vec<String> = urls
                .split(',')
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect();
            if !candidates.is_empty() {
                debug!(count = candidates.len(), "Overriding candidate URLs from environment");
                self.remote.candidate_urls = candidates;
            }
        }

        if let Ok(username) = std::env::var("SHOPKEEPER_SYNC_USERNAME") {
            self.remote.username = username;
        }

        if let Ok(password) = std::env::var("SHOPKEEPER_SYNC_PASSWORD") {
            self.remote.password = password;
        }

        if let Ok(timeout) = std::env::var("SHOPKEEPER_PROBE_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse::<u64>() {
                debug!(secs, "Overriding probe timeout from environment");
                self.remote.probe_timeout_secs = secs;
            }
        }

        if let Ok(batch) = std::env::var("SHOPKEEPER_SYNC_BATCH_SIZE") {
            if let Ok(size) = batch.parse::<usize>() {
                self.sync.batch_size = size;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "shopkeeper", "shopkeeper")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Probe timeout as a Duration.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.probe_timeout_secs)
    }

    /// Debounce window as a Duration.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.sync.debounce_ms)
    }

    /// Long-poll wait as a Duration.
    pub fn longpoll_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.longpoll_timeout_secs)
    }

    /// Settle delay as a Duration.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.sync.settle_delay_secs)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
