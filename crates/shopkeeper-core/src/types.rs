//! # Domain Types
//!
//! Core domain types kept offline and replicated to the shared document
//! store.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────────┐        ┌─────────────────────┐                │
//! │  │      Business       │        │       Article       │                │
//! │  │  ─────────────────  │        │  ─────────────────  │                │
//! │  │  id (primary key)   │ ◄──┐   │  id (primary key)   │                │
//! │  │  name               │    │   │  name               │                │
//! │  └─────────────────────┘    │   │  qty                │                │
//! │                             │   │  selling_price      │                │
//! │                             └── │  business_id (soft) │                │
//! │                                 └─────────────────────┘                │
//! │                                                                         │
//! │  The business_id reference is SOFT: an Article may outlive its         │
//! │  Business (orphans are tolerated, never rejected).                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Collection Names
// =============================================================================

/// Collection name for [`Business`] documents, locally and on the remote.
pub const BUSINESSES_COLLECTION: &str = "businesses";

/// Collection name for [`Article`] documents, locally and on the remote.
pub const ARTICLES_COLLECTION: &str = "articles";

// =============================================================================
// Business
// =============================================================================

/// A business owning a set of articles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Business {
    /// Unique identifier. Immutable once created.
    pub id: String,

    /// Display name.
    pub name: String,
}

impl Business {
    /// Creates a business with a freshly generated id.
    pub fn new(name: impl Into<String>) -> Self {
        Business {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
        }
    }

    /// Creates a business with a caller-provided id.
    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        Business {
            id: id.into(),
            name: name.into(),
        }
    }
}

// =============================================================================
// Article
// =============================================================================

/// An article carried by a business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Unique identifier. Immutable once created.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Quantity on hand.
    pub qty: i64,

    /// Selling price. Kept as the raw number the source data carries.
    pub selling_price: f64,

    /// Soft reference to the owning [`Business`]. Orphans are tolerated.
    pub business_id: String,
}

impl Article {
    /// Creates an article with a freshly generated id.
    pub fn new(
        name: impl Into<String>,
        qty: i64,
        selling_price: f64,
        business_id: impl Into<String>,
    ) -> Self {
        Article {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            qty,
            selling_price,
            business_id: business_id.into(),
        }
    }

    /// Creates an article with a caller-provided id.
    pub fn with_id(
        id: impl Into<String>,
        name: impl Into<String>,
        qty: i64,
        selling_price: f64,
        business_id: impl Into<String>,
    ) -> Self {
        Article {
            id: id.into(),
            name: name.into(),
            qty,
            selling_price,
            business_id: business_id.into(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
