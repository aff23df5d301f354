//! # Sync Controller
//!
//! Orchestrates the whole replication engine: owns the per-collection
//! sessions, the sync-enabled toggle, and the discovered endpoint. All of
//! that state lives in this one injected value object - there are no
//! module-level flags to read from ambient globals.
//!
//! ## Control Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncController                                   │
//! │                                                                         │
//! │  boot ──► Store::open ──► SyncController::new ──► start()              │
//! │                                                      │                  │
//! │                  ┌───────────────────────────────────┤                  │
//! │                  ▼                                   ▼                  │
//! │        connectivity watcher task            initial attempt             │
//! │                  │                                   │                  │
//! │   offline→online │ online→offline                    │                  │
//! │        ┌─────────┴──────────┐                        │                  │
//! │        ▼                    ▼                        ▼                  │
//! │  discovery, then      stop ALL sessions      discovery, then            │
//! │  one session per      immediately            one session per            │
//! │  collection           (no drain)             collection                 │
//! │                                                                         │
//! │  At most one session per collection, enforced structurally:            │
//! │  starting always cancels and discards any existing session first.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Status-reporting operations here (toggling, provisioning, reset) catch
//! their failures and return [`SyncOutcome`]; nothing is fatal.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use shopkeeper_store::{LocalStore, Store};

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::discovery::EndpointDiscovery;
use crate::error::{SyncError, SyncOutcome, SyncResult};
use crate::remote::RemoteClient;
use crate::session::{ReplicationSession, SessionSettings, SessionState};

// =============================================================================
// Sync Status
// =============================================================================

/// Derived, read-only snapshot of the replication engine.
#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    /// Current connectivity state.
    pub is_online: bool,

    /// Whether the user-facing sync toggle is on.
    pub sync_enabled: bool,

    /// Endpoint the sessions talk to (if discovered).
    pub current_url: Option<String>,

    /// Per-collection session state.
    pub collections: HashMap<String, SessionState>,

    /// Last session-level or discovery error (if any).
    pub last_error: Option<String>,
}

impl SyncStatus {
    /// True when the collection has a session in the Active state.
    pub fn is_active(&self, collection: &str) -> bool {
        matches!(self.collections.get(collection), Some(SessionState::Active))
    }

    /// Per-collection activity map.
    pub fn per_collection_active(&self) -> HashMap<String, bool> {
        self.collections
            .iter()
            .map(|(name, state)| (name.clone(), *state == SessionState::Active))
            .collect()
    }
}

// =============================================================================
// Controller Internals
// =============================================================================

struct ControllerInner {
    sync_enabled: bool,
    current_url: Option<String>,
    sessions: HashMap<String, ReplicationSession>,
    last_error: Option<String>,
    watcher: Option<JoinHandle<()>>,
}

// =============================================================================
// Sync Controller
// =============================================================================

/// The replication engine's orchestrator.
///
/// Cheap to clone; clones share the same session state.
#[derive(Clone)]
pub struct SyncController {
    config: Arc<SyncConfig>,
    store: Store,
    client: RemoteClient,
    connectivity: ConnectivityMonitor,
    discovery: EndpointDiscovery,
    inner: Arc<Mutex<ControllerInner>>,
}

impl SyncController {
    /// Creates a controller. Nothing runs until [`start`] is called.
    ///
    /// [`start`]: Self::start
    pub fn new(
        config: SyncConfig,
        store: Store,
        connectivity: ConnectivityMonitor,
    ) -> SyncResult<Self> {
        config.validate()?;

        let client = RemoteClient::new(
            config.remote.username.clone(),
            config.remote.password.clone(),
            config.probe_timeout(),
        )?;

        let discovery = EndpointDiscovery::new(
            config.remote.candidate_urls.clone(),
            client.clone(),
            store.cache().clone(),
        );

        Ok(SyncController {
            config: Arc::new(config),
            store,
            client,
            connectivity,
            discovery,
            inner: Arc::new(Mutex::new(ControllerInner {
                sync_enabled: false,
                current_url: None,
                sessions: HashMap::new(),
                last_error: None,
                watcher: None,
            })),
        })
    }

    /// Underlying store handle.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Connectivity monitor feeding this controller.
    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Enables sync, spawns the connectivity watcher, and - when the
    /// device is already online - runs discovery and starts one session
    /// per collection.
    pub async fn start(&self) -> SyncOutcome {
        {
            let mut inner = self.inner.lock().await;
            inner.sync_enabled = true;

            if inner.watcher.is_none() {
                let controller = self.clone();
                let rx = self.connectivity.subscribe();
                inner.watcher = Some(tokio::spawn(connectivity_watcher(controller, rx)));
                debug!("Connectivity watcher spawned");
            }
        }

        match self.try_start_sessions().await {
            Ok(url) => SyncOutcome::ok(format!("Sync started against {url}")),
            Err(SyncError::Offline) => {
                SyncOutcome::ok("Sync enabled; device offline, will sync when connectivity returns")
            }
            Err(e) => {
                self.record_error(&e).await;
                e.into()
            }
        }
    }

    /// Turns the sync toggle back on without respawning anything.
    pub async fn enable_sync(&self) -> SyncOutcome {
        self.inner.lock().await.sync_enabled = true;
        match self.try_start_sessions().await {
            Ok(url) => SyncOutcome::ok(format!("Sync enabled against {url}")),
            Err(SyncError::Offline) => SyncOutcome::ok("Sync enabled; device offline"),
            Err(e) => {
                self.record_error(&e).await;
                e.into()
            }
        }
    }

    /// Turns sync off and stops every session.
    pub async fn disable_sync(&self) -> SyncOutcome {
        {
            let mut inner = self.inner.lock().await;
            inner.sync_enabled = false;
        }
        self.stop_all_sessions().await;
        SyncOutcome::ok("Sync disabled")
    }

    /// Stops the watcher and every session. The controller can be
    /// started again afterwards.
    pub async fn shutdown(&self) {
        let watcher = {
            let mut inner = self.inner.lock().await;
            inner.sync_enabled = false;
            inner.watcher.take()
        };
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        self.stop_all_sessions().await;
        info!("Sync controller shut down");
    }

    // =========================================================================
    // Session Management
    // =========================================================================

    /// Runs discovery and (re)starts one session per collection.
    ///
    /// Returns the endpoint URL the sessions were bound to.
    async fn try_start_sessions(&self) -> SyncResult<String> {
        if !self.connectivity.is_online() {
            return Err(SyncError::Offline);
        }

        let url = self.discovery.discover().await?;

        let mut inner = self.inner.lock().await;
        if !inner.sync_enabled {
            // Toggled off while discovery was in flight.
            return Err(SyncError::InvalidConfig("Sync is disabled".into()));
        }
        inner.current_url = Some(url.clone());

        let settings = SessionSettings::from(self.config.as_ref());
        let mut first_error: Option<SyncError> = None;

        for collection in LocalStore::collection_names() {
            // Cancel-before-start: any existing session for the collection
            // is unconditionally stopped and discarded.
            if let Some(mut old) = inner.sessions.remove(collection) {
                old.stop().await;
            }

            match ReplicationSession::start(
                collection,
                &url,
                self.client.clone(),
                &self.store,
                settings.clone(),
            )
            .await
            {
                Ok(session) => {
                    inner.sessions.insert(collection.to_string(), session);
                }
                Err(e) => {
                    error!(collection, error = %e, "Failed to start replication session");
                    inner.last_error = Some(e.to_string());
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            None => Ok(url),
            Some(e) => Err(e),
        }
    }

    /// Stops and discards every session immediately. No grace period, no
    /// pending-operation drain.
    async fn stop_all_sessions(&self) {
        let mut inner = self.inner.lock().await;
        for (_, mut session) in inner.sessions.drain() {
            session.stop().await;
        }
        inner.current_url = None;
    }

    /// Reacts to one connectivity edge.
    async fn handle_transition(&self, online: bool) {
        if online {
            let enabled = self.inner.lock().await.sync_enabled;
            if !enabled {
                debug!("Back online but sync is disabled");
                return;
            }
            info!("Connectivity restored; starting replication");
            if let Err(e) = self.try_start_sessions().await {
                warn!(error = %e, "Could not start replication after reconnect");
                self.record_error(&e).await;
            }
        } else {
            info!("Connectivity lost; stopping replication");
            self.stop_all_sessions().await;
        }
    }

    async fn record_error(&self, error: &SyncError) {
        self.inner.lock().await.last_error = Some(error.to_string());
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Snapshot of the engine state.
    pub async fn status(&self) -> SyncStatus {
        let inner = self.inner.lock().await;
        SyncStatus {
            is_online: self.connectivity.is_online(),
            sync_enabled: inner.sync_enabled,
            current_url: inner.current_url.clone(),
            collections: inner
                .sessions
                .iter()
                .map(|(name, session)| (name.clone(), session.state()))
                .collect(),
            last_error: inner.last_error.clone(),
        }
    }

    // =========================================================================
    // Remote Provisioning
    // =========================================================================

    /// Ensures every collection exists on the remote (PUT, where HTTP 412
    /// means already-exists and counts as success).
    pub async fn ensure_remote_collections(&self) -> SyncOutcome {
        let url = match self.resolve_endpoint().await {
            Ok(url) => url,
            Err(e) => return e.into(),
        };

        for collection in LocalStore::collection_names() {
            if let Err(e) = self.client.create_collection(&url, collection).await {
                return SyncOutcome::failed(format!(
                    "Could not create remote collection {collection}: {e}"
                ));
            }
        }
        SyncOutcome::ok(format!("Remote collections ensured on {url}"))
    }

    /// Verifies every remote collection is empty via its row count.
    pub async fn verify_remote_empty(&self) -> SyncOutcome {
        let url = match self.resolve_endpoint().await {
            Ok(url) => url,
            Err(e) => return e.into(),
        };

        for collection in LocalStore::collection_names() {
            match self.client.total_rows(&url, collection).await {
                Ok(0) => {}
                Ok(rows) => {
                    return SyncOutcome::failed(format!(
                        "Remote collection {collection} still holds {rows} documents"
                    ))
                }
                Err(e) => return e.into(),
            }
        }
        SyncOutcome::ok("All remote collections are empty")
    }

    async fn resolve_endpoint(&self) -> SyncResult<String> {
        if !self.connectivity.is_online() {
            return Err(SyncError::Offline);
        }
        if let Some(url) = self.inner.lock().await.current_url.clone() {
            return Ok(url);
        }
        self.discovery.discover().await
    }

    // =========================================================================
    // Reset / Teardown
    // =========================================================================

    /// Stops all sessions, clears the Durable Cache (snapshots AND the
    /// persisted last-good endpoint), then empties the Local Store -
    /// strictly in that order. Sessions must not outlive the store they
    /// reference, and the cache is not read again after being cleared.
    pub async fn cleanup_and_reset(&self) -> SyncOutcome {
        {
            let mut inner = self.inner.lock().await;
            inner.sync_enabled = false;
        }
        self.stop_all_sessions().await;

        if let Err(e) = self.store.cache().clear().await {
            return SyncOutcome::failed(format!("Could not clear durable cache: {e}"));
        }

        self.store.clear_local();

        {
            let mut inner = self.inner.lock().await;
            inner.last_error = None;
        }

        info!("Local data reset complete");
        SyncOutcome::ok("Local data cleared")
    }

    /// [`cleanup_and_reset`], optionally extended with remote deletion and
    /// recreation of empty collections. A fixed settle delay between the
    /// two accommodates the remote's eventual-deletion semantics.
    ///
    /// [`cleanup_and_reset`]: Self::cleanup_and_reset
    pub async fn permanently_delete_all_data(&self, delete_remote: bool) -> SyncOutcome {
        let local = self.cleanup_and_reset().await;
        if !local.success {
            return local;
        }

        if !delete_remote {
            return SyncOutcome::ok("Local data cleared; remote untouched");
        }

        // The last-good endpoint was just cleared with everything else, so
        // this runs a full candidate scan.
        let url = match self.resolve_endpoint().await {
            Ok(url) => url,
            Err(e) => {
                return SyncOutcome::failed(format!(
                    "Local data cleared, but no endpoint for remote deletion: {e}"
                ))
            }
        };

        for collection in LocalStore::collection_names() {
            if let Err(e) = self.client.delete_collection(&url, collection).await {
                return SyncOutcome::failed(format!(
                    "Could not delete remote collection {collection}: {e}"
                ));
            }
        }

        tokio::time::sleep(self.config.settle_delay()).await;

        for collection in LocalStore::collection_names() {
            if let Err(e) = self.client.create_collection(&url, collection).await {
                return SyncOutcome::failed(format!(
                    "Could not recreate remote collection {collection}: {e}"
                ));
            }
        }

        let verification = self.verify_remote_empty().await;
        if !verification.success {
            warn!(message = %verification.message, "Remote not verifiably empty after reset");
        }

        SyncOutcome::ok(format!("Local and remote data cleared on {url}"))
    }
}

// =============================================================================
// Connectivity Watcher
// =============================================================================

/// Background task translating connectivity edges into session lifecycle.
async fn connectivity_watcher(
    controller: SyncController,
    mut rx: tokio::sync::watch::Receiver<bool>,
) {
    debug!("Connectivity watcher running");
    while rx.changed().await.is_ok() {
        let online = *rx.borrow_and_update();
        controller.handle_transition(online).await;
    }
    debug!("Connectivity watcher stopped");
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use shopkeeper_core::Business;

    async fn offline_controller() -> SyncController {
        let store = Store::open_in_memory().await.unwrap();
        let mut config = SyncConfig::default();
        config.remote.candidate_urls = vec!["http://unreachable.invalid:5984".into()];
        let connectivity = ConnectivityMonitor::new(false);
        SyncController::new(config, store, connectivity).unwrap()
    }

    #[tokio::test]
    async fn test_offline_start_enables_without_sessions() {
        let controller = offline_controller().await;
        let outcome = controller.start().await;
        assert!(outcome.success);

        let status = controller.status().await;
        assert!(status.sync_enabled);
        assert!(!status.is_online);
        assert!(status.collections.is_empty());
        assert_eq!(status.current_url, None);
    }

    #[tokio::test]
    async fn test_offline_mutations_reach_durable_cache_only() {
        let controller = offline_controller().await;
        controller.start().await;

        controller
            .store()
            .businesses()
            .add(Business::with_id("b2", "Offline Co"))
            .await
            .unwrap();

        let snapshot = controller
            .store()
            .cache()
            .snapshot("businesses")
            .await
            .unwrap()
            .unwrap();
        assert!(snapshot.contains("\"b2\""));

        // Still no endpoint: nothing was discovered or contacted.
        assert_eq!(controller.status().await.current_url, None);
    }

    #[tokio::test]
    async fn test_disable_sync_is_idempotent() {
        let controller = offline_controller().await;
        controller.start().await;
        assert!(controller.disable_sync().await.success);
        assert!(controller.disable_sync().await.success);
        assert!(!controller.status().await.sync_enabled);
    }

    #[tokio::test]
    async fn test_cleanup_and_reset_clears_both_copies() {
        let controller = offline_controller().await;
        controller
            .store()
            .businesses()
            .add(Business::with_id("b1", "Acme"))
            .await
            .unwrap();

        let outcome = controller.cleanup_and_reset().await;
        assert!(outcome.success);
        assert_eq!(controller.store().businesses().count(), 0);
        assert_eq!(
            controller.store().cache().snapshot("businesses").await.unwrap(),
            None
        );
    }
}
