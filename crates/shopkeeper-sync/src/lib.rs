//! # shopkeeper-sync: Replication Engine for Shopkeeper
//!
//! This crate keeps the on-device dataset (Local Store + Durable Cache)
//! synchronized with the shared multi-device document store over HTTP,
//! opportunistically, whenever connectivity allows.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Replication Engine                                   │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  SyncController (orchestrator)                   │  │
//! │  │                                                                  │  │
//! │  │  Owns the sync toggle, the discovered endpoint and one           │  │
//! │  │  ReplicationSession per collection                               │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Connectivity   │  │   Endpoint     │  │  ReplicationSession    │    │
//! │  │ Monitor        │  │   Discovery    │  │                        │    │
//! │  │                │  │                │  │  push channel (bulk    │    │
//! │  │ edge-triggered │  │ sequential     │  │  submit) + pull        │    │
//! │  │ online/offline │  │ probe, last-   │  │  channel (long-poll),  │    │
//! │  │ transitions    │  │ good first     │  │  debounced flush       │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  offline → online : discovery, then start sessions for all collections │
//! │  online → offline : stop all sessions immediately, no drain            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`controller`] - `SyncController` orchestrator and `SyncStatus`
//! - [`session`] - per-collection replication sessions and debounced flush
//! - [`discovery`] - endpoint discovery over the candidate list
//! - [`connectivity`] - edge-triggered online/offline monitor
//! - [`remote`] - HTTP client for the remote replica (Basic auth)
//! - [`config`] - sync configuration (TOML + environment)
//! - [`error`] - sync error types and structured outcomes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shopkeeper_store::{CacheConfig, Store};
//! use shopkeeper_sync::{ConnectivityMonitor, SyncConfig, SyncController};
//!
//! let store = Store::open(CacheConfig::new("./shopkeeper-cache.db")).await?;
//! let config = SyncConfig::load_or_default(None);
//! let connectivity = ConnectivityMonitor::new(platform_reports_online);
//!
//! let controller = SyncController::new(config, store.clone(), connectivity.clone())?;
//! controller.start().await;
//!
//! // The platform network callback feeds transitions in:
//! connectivity.set_online(false);
//!
//! // Screens query the derived status:
//! let status = controller.status().await;
//! println!("online: {}", status.is_online);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod connectivity;
pub mod controller;
pub mod discovery;
pub mod error;
pub mod remote;
pub mod session;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{RemoteSettings, SyncConfig, SyncSettings};
pub use connectivity::ConnectivityMonitor;
pub use controller::{SyncController, SyncStatus};
pub use discovery::EndpointDiscovery;
pub use error::{SyncError, SyncOutcome, SyncResult};
pub use remote::RemoteClient;
pub use session::{FlushScheduler, ReplicationSession, SessionSettings, SessionState};
