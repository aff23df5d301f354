//! # Error Types
//!
//! Domain-specific error types for shopkeeper-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  shopkeeper-core errors (this file)                                    │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  shopkeeper-store errors (separate crate)                              │
//! │  └── StoreError       - Local Store / Durable Cache failures           │
//! │                                                                         │
//! │  shopkeeper-sync errors (separate crate)                               │
//! │  └── SyncError        - Discovery / replication failures               │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → StoreError → SyncError            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (entity, id)
//! 3. Errors are enum variants, never String
//! 4. Duplicate detection is a typed variant checked structurally,
//!    never a substring match on an error message

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
///
/// These represent domain rule violations. They should be caught and
/// translated to user-friendly messages by the (excluded) UI layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity cannot be found in a collection.
    ///
    /// ## When This Occurs
    /// - Updating or deleting an id that was never inserted
    /// - An id removed by a replicated deletion from another device
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Entity id already exists in the collection.
    ///
    /// ## When This Occurs
    /// - Inserting an id twice
    /// - Reloading a durable snapshot over a warm Local Store (callers
    ///   swallow this variant; the reload is idempotent)
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: String, id: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and id.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates an AlreadyExists error for a given entity type and id.
    pub fn already_exists(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::AlreadyExists {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Returns true for the duplicate-insert variant.
    ///
    /// Structural check; callers must never match on the message text.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, CoreError::AlreadyExists { .. })
    }

    /// Returns true for the missing-entity variant.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound { .. })
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when a document doesn't meet the collection schema.
/// Used for early validation before any copy of the data is touched.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Invalid numeric value (NaN, infinity).
    #[error("{field} has invalid value: {reason}")]
    InvalidNumber { field: String, reason: String },

    /// Document body does not match the collection schema at all
    /// (wrong shape, missing fields, wrong types).
    #[error("document is malformed: {reason}")]
    Malformed { reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
