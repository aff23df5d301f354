//! # Store Error Types
//!
//! Error types for Local Store and Durable Cache operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  CoreError (domain / validation)     sqlx::Error (SQLite)              │
//! │       │                                   │                             │
//! │       └────────────┬──────────────────────┘                             │
//! │                    ▼                                                    │
//! │  StoreError (this module) ← Adds context and categorization            │
//! │                    │                                                    │
//! │                    ▼                                                    │
//! │  SyncError (shopkeeper-sync) or the caller's UI layer                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A Durable Cache failure after an in-memory mutation is NOT fatal and is
//! never rolled back: callers log it and carry on with a lagging cache.

use thiserror::Error;

use shopkeeper_core::CoreError;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the Local Store or the Durable Cache.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Domain error bubbled up from the Local Store (NotFound,
    /// AlreadyExists, Validation).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A collection name that the Local Store does not know.
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// Snapshot (de)serialization failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Durable Cache connection failed.
    ///
    /// ## When This Occurs
    /// - Cache file cannot be created (permissions, disk full)
    /// - Pool is closed
    #[error("Cache connection failed: {0}")]
    ConnectionFailed(String),

    /// Durable Cache migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Durable Cache query failed.
    #[error("Cache query failed: {0}")]
    QueryFailed(String),

    /// Internal store error.
    #[error("Internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Returns true when the underlying cause is a duplicate insert.
    ///
    /// Structural check; never matches on message text.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::Core(e) if e.is_already_exists())
    }

    /// Returns true when the underlying cause is a missing entity.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Core(e) if e.is_not_found())
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed => {
                StoreError::ConnectionFailed("Pool is closed".to_string())
            }
            sqlx::Error::PoolTimedOut => {
                StoreError::ConnectionFailed("Pool timed out".to_string())
            }
            other => StoreError::QueryFailed(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists_is_structural() {
        let err: StoreError = CoreError::already_exists("Business", "b1").into();
        assert!(err.is_already_exists());
        assert!(!err.is_not_found());

        let err = StoreError::QueryFailed("UNIQUE constraint failed".to_string());
        assert!(!err.is_already_exists());
    }
}
