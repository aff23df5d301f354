//! # Store Handle
//!
//! The explicit, passed-by-reference handle over both on-device data
//! copies. Created once at startup; there is no process-wide singleton and
//! no lazy global initialization, so tests get isolated instances and
//! there is no first-use race to guard against.
//!
//! ## Boot Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Store::open(config)                                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DurableCache::open     ← create/connect SQLite, run migrations        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  LocalStore::new        ← collections registered with their schemas    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  load_durable_into_local (per collection)                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Ready: reads serve from memory, writes mirror back to the cache       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tracing::info;

use crate::cache::{CacheConfig, DurableCache};
use crate::error::StoreResult;
use crate::local::LocalStore;
use crate::repository::{ArticleRepository, BusinessRepository};
use crate::synchronizer::ConsistencySynchronizer;

/// Main store handle providing repository access.
///
/// Cheap to clone; clones share the same Local Store and cache pool.
///
/// ## Usage
/// ```rust,ignore
/// let store = Store::open(CacheConfig::new("./shopkeeper-cache.db")).await?;
///
/// store.businesses().add(Business::with_id("b1", "Acme")).await?;
/// let articles = store.articles().find_by_business("b1");
/// ```
#[derive(Clone)]
pub struct Store {
    local: Arc<LocalStore>,
    cache: DurableCache,
}

impl Store {
    /// Opens the durable cache, creates the Local Store, and loads every
    /// durable snapshot into memory.
    pub async fn open(config: CacheConfig) -> StoreResult<Self> {
        let cache = DurableCache::open(config).await?;
        let store = Store {
            local: Arc::new(LocalStore::new()),
            cache,
        };

        store.synchronizer().load_all().await?;

        info!(
            businesses = store.businesses().count(),
            articles = store.articles().count(),
            "Store opened"
        );
        Ok(store)
    }

    /// Opens a store over a fresh in-memory cache (for testing).
    pub async fn open_in_memory() -> StoreResult<Self> {
        Self::open(CacheConfig::in_memory()).await
    }

    /// Returns the business repository.
    pub fn businesses(&self) -> BusinessRepository {
        BusinessRepository::new(self.local.businesses(), self.synchronizer())
    }

    /// Returns the article repository.
    pub fn articles(&self) -> ArticleRepository {
        ArticleRepository::new(self.local.articles(), self.synchronizer())
    }

    /// Returns a synchronizer over this store pair.
    pub fn synchronizer(&self) -> ConsistencySynchronizer {
        ConsistencySynchronizer::new(self.local.clone(), self.cache.clone())
    }

    /// Returns the underlying Local Store.
    pub fn local(&self) -> Arc<LocalStore> {
        self.local.clone()
    }

    /// Returns the underlying Durable Cache.
    pub fn cache(&self) -> &DurableCache {
        &self.cache
    }

    /// Drops every in-memory document. Used by reset flows AFTER sessions
    /// are stopped and the cache is cleared.
    pub fn clear_local(&self) {
        self.local.clear_all();
    }

    /// Closes the cache pool.
    pub async fn close(&self) {
        self.cache.close().await;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
