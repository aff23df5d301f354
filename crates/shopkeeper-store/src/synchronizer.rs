//! # Consistency Synchronizer
//!
//! Reconciles the Local Store and the Durable Cache. Three operations, none
//! transactional across the two stores:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Consistency Synchronizer                              │
//! │                                                                         │
//! │  load_durable_into_local          boot: snapshot → Local Store          │
//! │  flush_local_into_durable         Local Store → snapshot (wholesale)    │
//! │  reconcile                        alias for flush; runs after every     │
//! │                                   CRUD mutation and after every         │
//! │                                   debounced replication event           │
//! │                                                                         │
//! │  The flush is a full, non-atomic overwrite. Two logically concurrent   │
//! │  flushes race: whichever write lands last wins, and the other flush's  │
//! │  effect is silently discarded. Accepted - the next flush converges.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::DurableCache;
use crate::error::{StoreError, StoreResult};
use crate::local::LocalStore;

/// Reconciles Local Store content with the Durable Cache.
///
/// Cheap to clone; used both by the CRUD repositories (synchronous
/// reconcile after mutations) and by replication sessions (debounced
/// reconcile after batches).
#[derive(Clone)]
pub struct ConsistencySynchronizer {
    local: Arc<LocalStore>,
    cache: DurableCache,
}

impl ConsistencySynchronizer {
    /// Creates a synchronizer over the given store pair.
    pub fn new(local: Arc<LocalStore>, cache: DurableCache) -> Self {
        ConsistencySynchronizer { local, cache }
    }

    /// Loads the durable snapshot of one collection into the Local Store.
    ///
    /// Per-record behavior:
    /// - `AlreadyExists` is swallowed (reloading over a warm store is
    ///   idempotent; restarts replay the same snapshot)
    /// - any other insert failure is logged and the record skipped
    ///
    /// Returns the number of records actually inserted.
    pub async fn load_durable_into_local(&self, collection: &str) -> StoreResult<usize> {
        let raw = self
            .local
            .collection(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        let Some(json) = self.cache.snapshot(collection).await? else {
            debug!(collection, "No durable snapshot yet");
            return Ok(0);
        };

        let records: Vec<Value> = serde_json::from_str(&json)?;
        let total = records.len();
        let mut loaded = 0;

        for record in records {
            match raw.insert_value(record) {
                Ok(()) => loaded += 1,
                Err(e) if e.is_already_exists() => {
                    // idempotent reload on restart
                }
                Err(e) => {
                    warn!(collection, error = %e, "Skipping unloadable snapshot record");
                }
            }
        }

        debug!(collection, loaded, total, "Loaded durable snapshot");
        Ok(loaded)
    }

    /// Overwrites the durable snapshot of one collection with the entire
    /// Local Store content. This is the ONLY write path to the snapshots.
    ///
    /// Returns the number of documents written.
    pub async fn flush_local_into_durable(&self, collection: &str) -> StoreResult<usize> {
        let raw = self
            .local
            .collection(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        let values = raw.to_values();
        let json = serde_json::to_string(&values)?;
        self.cache.put_snapshot(collection, &json).await?;

        debug!(collection, count = values.len(), "Flushed collection to durable cache");
        Ok(values.len())
    }

    /// Convenience alias for [`flush_local_into_durable`].
    ///
    /// [`flush_local_into_durable`]: Self::flush_local_into_durable
    pub async fn reconcile(&self, collection: &str) -> StoreResult<usize> {
        self.flush_local_into_durable(collection).await
    }

    /// Boot helper: loads every registered collection.
    pub async fn load_all(&self) -> StoreResult<()> {
        for name in LocalStore::collection_names() {
            self.load_durable_into_local(name).await?;
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
