//! # Sync Error Types
//!
//! Error types for discovery and replication.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Connectivity   │  │   Transport     │  │     Replication         │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Offline        │  │  Transport      │  │  RemoteNotFound         │ │
//! │  │  NoEndpoint-    │  │  UnexpectedSta- │  │  Replication            │ │
//! │  │  Available      │  │  tus            │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │  Configuration  │  │     Storage     │                              │
//! │  │                 │  │                 │                              │
//! │  │  InvalidConfig  │  │  Store          │                              │
//! │  │  InvalidUrl     │  │  Serialization  │                              │
//! │  │  ConfigLoad/-   │  │                 │                              │
//! │  │  SaveFailed     │  │                 │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here is fatal to the process: the worst case is a dataset that
//! stays valid locally but unsynchronized indefinitely.

use serde::Serialize;
use thiserror::Error;

use shopkeeper_store::StoreError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering discovery and replication failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Connectivity Errors
    // =========================================================================
    /// The device is offline; no remote operation was attempted.
    #[error("Device is offline")]
    Offline,

    /// No candidate endpoint answered a health probe.
    #[error("No endpoint available ({probed} candidates probed)")]
    NoEndpointAvailable { probed: usize },

    // =========================================================================
    // Replication Errors
    // =========================================================================
    /// The remote collection does not exist.
    #[error("Remote collection not found: {collection}")]
    RemoteNotFound { collection: String },

    /// Session-level replication failure. Non-fatal: the session stays
    /// alive in the Errored state and is not torn down automatically.
    #[error("Replication error on {collection}: {message}")]
    Replication { collection: String, message: String },

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// HTTP transport failure (connect, timeout, body read).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote answered with a status the caller can't proceed on.
    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid candidate or endpoint URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Local Store / Durable Cache failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Wire body (de)serialization failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Transport(format!("request timed out: {err}"))
        } else if err.is_connect() {
            SyncError::Transport(format!("connection failed: {err}"))
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if retrying later (more connectivity, another
    /// transition) could succeed without a config change.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Offline
                | SyncError::NoEndpointAvailable { .. }
                | SyncError::Transport(_)
                | SyncError::Replication { .. }
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

// =============================================================================
// Structured Outcome
// =============================================================================

/// Structured result of a status-reporting operation (discovery, sync
/// toggling, remote provisioning). These operations catch their failures
/// instead of raising: the caller always gets `{ success, message }`.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    /// Whether the operation achieved its goal.
    pub success: bool,

    /// Human-readable description of what happened.
    pub message: String,
}

impl SyncOutcome {
    /// Builds a success outcome.
    pub fn ok(message: impl Into<String>) -> Self {
        SyncOutcome {
            success: true,
            message: message.into(),
        }
    }

    /// Builds a failure outcome.
    pub fn failed(message: impl Into<String>) -> Self {
        SyncOutcome {
            success: false,
            message: message.into(),
        }
    }
}

impl From<SyncError> for SyncOutcome {
    fn from(err: SyncError) -> Self {
        SyncOutcome::failed(err.to_string())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Offline.is_retryable());
        assert!(SyncError::NoEndpointAvailable { probed: 2 }.is_retryable());
        assert!(SyncError::Transport("connection refused".into()).is_retryable());

        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
        assert!(!SyncError::RemoteNotFound {
            collection: "articles".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_outcome_from_error() {
        let outcome: SyncOutcome = SyncError::Offline.into();
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Device is offline");
    }
}
