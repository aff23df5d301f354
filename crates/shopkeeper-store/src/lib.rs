//! # shopkeeper-store: Local Store + Durable Cache
//!
//! This crate owns both on-device copies of the dataset and keeps them
//! reconciled.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Shopkeeper Data Flow                               │
//! │                                                                         │
//! │  Caller (UI layer, out of scope)                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 shopkeeper-store (THIS CRATE)                   │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────┐   ┌────────────────┐   ┌─────────────────┐  │   │
//! │  │   │  LocalStore  │   │ Repositories   │   │ Consistency     │  │   │
//! │  │   │  (local.rs)  │◄──│ (repository/)  │──►│ Synchronizer    │  │   │
//! │  │   │              │   │                │   │                 │  │   │
//! │  │   │ in-memory,   │   │ add/update/    │   │ load / flush /  │  │   │
//! │  │   │ validated,   │   │ delete/lookup  │   │ reconcile       │  │   │
//! │  │   │ queryable    │   │                │   │                 │  │   │
//! │  │   └──────────────┘   └────────────────┘   └────────┬────────┘  │   │
//! │  │                                                    │           │   │
//! │  │                                           ┌────────▼────────┐  │   │
//! │  │                                           │  DurableCache   │  │   │
//! │  │                                           │  (cache.rs)     │  │   │
//! │  │                                           │  SQLite kv      │  │   │
//! │  │                                           └─────────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       ▲                                                                 │
//! │       │ change log + raw document seam                                  │
//! │  shopkeeper-sync (replication sessions)                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`local`] - in-memory Local Store (collections, change log)
//! - [`cache`] - Durable Cache (SQLite key-value snapshots)
//! - [`migrations`] - embedded cache migrations
//! - [`synchronizer`] - Consistency Synchronizer (load / flush / reconcile)
//! - [`repository`] - CRUD repositories
//! - [`handle`] - the explicit [`Store`] handle
//! - [`error`] - store error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod error;
pub mod handle;
pub mod local;
pub mod migrations;
pub mod repository;
pub mod synchronizer;

// =============================================================================
// Re-exports
// =============================================================================

pub use cache::{CacheConfig, DurableCache};
pub use error::{StoreError, StoreResult};
pub use handle::Store;
pub use local::{Change, Collection, Document, LocalStore, RawCollection};
pub use repository::{ArticleRepository, BusinessRepository};
pub use synchronizer::ConsistencySynchronizer;
