//! # Durable Cache
//!
//! On-device persistence that lets the dataset survive process restarts.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Durable Cache                                     │
//! │                                                                         │
//! │  One SQLite key-value table holds everything the device persists:      │
//! │                                                                         │
//! │  ┌───────────────────────────┬──────────────────────────────────────┐  │
//! │  │ key                       │ value                                │  │
//! │  ├───────────────────────────┼──────────────────────────────────────┤  │
//! │  │ snapshot:businesses       │ [{"id":"b1","name":"Acme"}, ...]     │  │
//! │  │ snapshot:articles         │ [{"id":"a1","name":"Widget", ...}]   │  │
//! │  │ sync:last_good_url        │ http://hub.local:5984                │  │
//! │  └───────────────────────────┴──────────────────────────────────────┘  │
//! │                                                                         │
//! │  Snapshots are written WHOLESALE: every flush replaces the entire      │
//! │  JSON array for a collection. Two concurrent flushes therefore race    │
//! │  and the last write wins - accepted for a dataset this small.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! File-backed caches run SQLite in WAL (Write-Ahead Logging) mode:
//! readers don't block writers and crash recovery is cleaner.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::migrations;

// =============================================================================
// Cache Keys
// =============================================================================

/// Key prefix for collection snapshots.
const SNAPSHOT_KEY_PREFIX: &str = "snapshot:";

/// Key holding the last endpoint that answered a health probe.
const LAST_GOOD_URL_KEY: &str = "sync:last_good_url";

/// Returns the cache key for a collection snapshot.
fn snapshot_key(collection: &str) -> String {
    format!("{SNAPSHOT_KEY_PREFIX}{collection}")
}

// =============================================================================
// Configuration
// =============================================================================

/// Durable Cache configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = CacheConfig::new("/path/to/shopkeeper-cache.db")
///     .max_connections(5);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5 (sufficient for a single-device app)
    pub max_connections: u32,

    /// Connection timeout duration.
    pub connect_timeout: Duration,

    /// Whether to run migrations on connect.
    pub run_migrations: bool,
}

impl CacheConfig {
    /// Creates a configuration with the given database path.
    /// The file is created on first open if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CacheConfig {
            database_path: path.into(),
            max_connections: 5,
            connect_timeout: Duration::from_secs(30),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Creates an in-memory cache configuration (for testing).
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let cache = DurableCache::open(CacheConfig::in_memory()).await?;
    /// // Cache is isolated, perfect for tests
    /// ```
    pub fn in_memory() -> Self {
        CacheConfig {
            database_path: PathBuf::from(":memory:"),
            // In-memory requires a single connection: each new connection
            // would otherwise see its own empty database
            max_connections: 1,
            connect_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_path == Path::new(":memory:")
    }
}

// =============================================================================
// Durable Cache
// =============================================================================

/// Handle to the on-device persisted key-value store.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct DurableCache {
    pool: SqlitePool,
}

impl DurableCache {
    /// Opens (and if needed creates) the cache database.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite (WAL journal, NORMAL synchronous)
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn open(config: CacheConfig) -> StoreResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Opening durable cache"
        );

        let connect_options = if config.is_in_memory() {
            SqliteConnectOptions::new().in_memory(true)
        } else {
            SqliteConnectOptions::new()
                .filename(&config.database_path)
                .create_if_missing(true)
                // WAL mode: readers don't block writers
                .journal_mode(SqliteJournalMode::Wal)
                // NORMAL synchronous: safe from corruption, may lose the
                // last transaction on power loss
                .synchronous(SqliteSynchronous::Normal)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect_with(connect_options)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        debug!(max_connections = config.max_connections, "Cache pool created");

        let cache = DurableCache { pool };

        if config.run_migrations {
            cache.run_migrations().await?;
        }

        Ok(cache)
    }

    /// Runs pending cache migrations. Idempotent.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    // =========================================================================
    // Raw Key-Value Operations
    // =========================================================================

    /// Reads the value stored under a key.
    pub async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM cache_entries WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    /// Writes a value under a key, replacing any previous value wholesale.
    pub async fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO cache_entries (key, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
             updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Removes one key. Removing an absent key is a no-op.
    pub async fn remove(&self, key: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM cache_entries WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes EVERY entry, snapshots and sync state alike.
    /// Used by reset flows; the cache must not be read again afterwards
    /// until something re-populates it.
    pub async fn clear(&self) -> StoreResult<()> {
        sqlx::query("DELETE FROM cache_entries")
            .execute(&self.pool)
            .await?;
        info!("Durable cache cleared");
        Ok(())
    }

    // =========================================================================
    // Typed Helpers
    // =========================================================================

    /// Reads the JSON snapshot of a collection.
    pub async fn snapshot(&self, collection: &str) -> StoreResult<Option<String>> {
        self.get(&snapshot_key(collection)).await
    }

    /// Overwrites the JSON snapshot of a collection.
    pub async fn put_snapshot(&self, collection: &str, json: &str) -> StoreResult<()> {
        self.put(&snapshot_key(collection), json).await
    }

    /// Reads the persisted last-known-good endpoint URL.
    pub async fn last_good_url(&self) -> StoreResult<Option<String>> {
        self.get(LAST_GOOD_URL_KEY).await
    }

    /// Persists the last endpoint that answered a health probe.
    pub async fn set_last_good_url(&self, url: &str) -> StoreResult<()> {
        self.put(LAST_GOOD_URL_KEY, url).await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Checks if the cache is responsive.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    /// Closes the connection pool. All operations fail afterwards.
    pub async fn close(&self) {
        info!("Closing durable cache pool");
        self.pool.close().await;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_cache() -> DurableCache {
        DurableCache::open(CacheConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let cache = open_cache().await;

        assert_eq!(cache.get("k").await.unwrap(), None);
        cache.put("k", "v1").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v1".to_string()));

        cache.put("k", "v2").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v2".to_string()));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let cache = open_cache().await;
        cache.put("k", "v").await.unwrap();
        cache.remove("k").await.unwrap();
        cache.remove("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let cache = open_cache().await;
        cache.put_snapshot("businesses", "[]").await.unwrap();
        cache.set_last_good_url("http://hub:5984").await.unwrap();

        cache.clear().await.unwrap();

        assert_eq!(cache.snapshot("businesses").await.unwrap(), None);
        assert_eq!(cache.last_good_url().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_last_good_url_round_trip() {
        let cache = open_cache().await;
        assert_eq!(cache.last_good_url().await.unwrap(), None);
        cache.set_last_good_url("http://hub:5984").await.unwrap();
        assert_eq!(
            cache.last_good_url().await.unwrap(),
            Some("http://hub:5984".to_string())
        );
    }

    #[tokio::test]
    async fn test_health_check() {
        let cache = open_cache().await;
        assert!(cache.health_check().await);
        cache.close().await;
        assert!(!cache.health_check().await);
    }
}
