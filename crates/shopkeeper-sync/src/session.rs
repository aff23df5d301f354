//! # Replication Session
//!
//! One live, bidirectional sync task per collection, bound to the
//! discovered remote endpoint.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Replication Session States                             │
//! │                                                                         │
//! │  ┌─────────┐   start()    ┌──────────┐   channels up   ┌────────┐      │
//! │  │ Stopped │ ───────────► │ Starting │ ──────────────► │ Active │      │
//! │  └─────────┘              └──────────┘                 └───┬────┘      │
//! │       ▲                        │                           │           │
//! │       │                        │ remote collection         │ transport │
//! │       │                        │ missing: RemoteNotFound   │ error     │
//! │       │                        ▼                           ▼           │
//! │       │                   (no session)               ┌─────────┐       │
//! │       └──────────────────────────────────────────────│ Errored │       │
//! │                        stop() from any state         └─────────┘       │
//! │                                                                         │
//! │  An Errored session is NOT torn down automatically and does NOT        │
//! │  retry on its own: it stays alive, surfaces through SyncStatus, and    │
//! │  waits for stop(). Connectivity transitions recreate sessions from     │
//! │  scratch - sessions are never mutated in place.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Channels
//! - **Pull**: long-polls the remote change feed and applies documents
//!   (upserts and tombstones) into the Local Store.
//! - **Push**: drains the Local Store change log in batches and
//!   bulk-submits them, skipping changes that arrived FROM the remote.
//!
//! Both channels are bounded by the same batch size, and both schedule a
//! debounced durable flush after every successful batch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use shopkeeper_store::{ConsistencySynchronizer, RawCollection, Store};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteClient;

// =============================================================================
// Session State
// =============================================================================

/// State of one replication session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not running.
    Stopped,
    /// Verifying the remote collection and opening channels.
    Starting,
    /// Both channels live.
    Active,
    /// A channel hit a transport-level error. The session is alive but
    /// quiet; it will not recover without being recreated.
    Errored,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Stopped => write!(f, "stopped"),
            SessionState::Starting => write!(f, "starting"),
            SessionState::Active => write!(f, "active"),
            SessionState::Errored => write!(f, "errored"),
        }
    }
}

// =============================================================================
// Session Settings
// =============================================================================

/// Per-session tuning, extracted from [`SyncConfig`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Documents per push/pull batch.
    pub batch_size: usize,

    /// Debounce window for the post-batch durable flush.
    pub debounce: Duration,

    /// Long-poll wait on the remote change feed.
    pub longpoll_timeout: Duration,
}

impl From<&SyncConfig> for SessionSettings {
    fn from(config: &SyncConfig) -> Self {
        SessionSettings {
            batch_size: config.sync.batch_size,
            debounce: config.debounce(),
            longpoll_timeout: config.longpoll_timeout(),
        }
    }
}

// =============================================================================
// Flush Scheduler
// =============================================================================

/// Debounced durable flush with an explicit, cancellable timer handle.
///
/// Every replication event calls [`schedule`]; a pending timer is aborted
/// and rearmed, so a burst of batches collapses into one flush after the
/// window. [`cancel`] drops the pending timer without flushing.
///
/// [`schedule`]: FlushScheduler::schedule
/// [`cancel`]: FlushScheduler::cancel
pub struct FlushScheduler {
    synchronizer: ConsistencySynchronizer,
    collection: String,
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl FlushScheduler {
    /// Creates a scheduler flushing one collection.
    pub fn new(
        synchronizer: ConsistencySynchronizer,
        collection: impl Into<String>,
        delay: Duration,
    ) -> Self {
        FlushScheduler {
            synchronizer,
            collection: collection.into(),
            delay,
            pending: Mutex::new(None),
        }
    }

    /// (Re)arms the flush timer. A pending flush is cancelled first, so
    /// the flush always runs `delay` after the LAST event of a burst.
    pub fn schedule(&self) {
        let mut pending = self.pending.lock().unwrap();
        if let Some(timer) = pending.take() {
            timer.abort();
        }

        let synchronizer = self.synchronizer.clone();
        let collection = self.collection.clone();
        let delay = self.delay;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = synchronizer.flush_local_into_durable(&collection).await {
                warn!(
                    collection = %collection,
                    error = %e,
                    "Debounced flush failed; cache lags the Local Store"
                );
            }
        }));
    }

    /// Drops any pending flush timer without flushing.
    pub fn cancel(&self) {
        if let Some(timer) = self.pending.lock().unwrap().take() {
            timer.abort();
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

// =============================================================================
// Replication Session
// =============================================================================

/// Shared context of a session's two channel tasks.
struct ChannelContext {
    collection: String,
    remote_url: String,
    client: RemoteClient,
    raw: Arc<dyn RawCollection>,
    state: Arc<watch::Sender<SessionState>>,
    flush: Arc<FlushScheduler>,
    /// Known remote revision per document id, fed by both channels so
    /// pushes revise the remote head instead of always conflicting.
    revs: Arc<Mutex<HashMap<String, String>>>,
    batch_size: usize,
}

/// A live bidirectional replication session for one collection.
///
/// Sessions are created by `start` and torn down by `stop`; they are never
/// reconfigured in place.
pub struct ReplicationSession {
    collection: String,
    remote_url: String,
    state_rx: watch::Receiver<SessionState>,
    state_tx: Arc<watch::Sender<SessionState>>,
    shutdown_tx: watch::Sender<bool>,
    push_task: Option<JoinHandle<()>>,
    pull_task: Option<JoinHandle<()>>,
    flush: Arc<FlushScheduler>,
}

impl std::fmt::Debug for ReplicationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationSession")
            .field("collection", &self.collection)
            .field("remote_url", &self.remote_url)
            .field("state", &*self.state_rx.borrow())
            .finish_non_exhaustive()
    }
}

impl ReplicationSession {
    /// Starts replication of one collection against the remote.
    ///
    /// Verifies the remote collection exists first, failing fast with
    /// [`SyncError::RemoteNotFound`]; then opens the push and pull
    /// channels, both live, both bounded by the configured batch size.
    pub async fn start(
        collection: &str,
        remote_url: &str,
        client: RemoteClient,
        store: &Store,
        settings: SessionSettings,
    ) -> SyncResult<ReplicationSession> {
        let raw = store
            .local()
            .collection(collection)
            .ok_or_else(|| SyncError::InvalidConfig(format!("Unknown collection: {collection}")))?;

        let (state_tx, state_rx) = watch::channel(SessionState::Starting);
        let state_tx = Arc::new(state_tx);

        // The remote collection must exist before any channel opens.
        if !client.collection_exists(remote_url, collection).await? {
            return Err(SyncError::RemoteNotFound {
                collection: collection.to_string(),
            });
        }

        let flush = Arc::new(FlushScheduler::new(
            store.synchronizer(),
            collection,
            settings.debounce,
        ));
        let revs = Arc::new(Mutex::new(HashMap::new()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let push_ctx = ChannelContext {
            collection: collection.to_string(),
            remote_url: remote_url.to_string(),
            client: client.clone(),
            raw: raw.clone(),
            state: state_tx.clone(),
            flush: flush.clone(),
            revs: revs.clone(),
            batch_size: settings.batch_size,
        };
        let pull_ctx = ChannelContext {
            collection: collection.to_string(),
            remote_url: remote_url.to_string(),
            client,
            raw,
            state: state_tx.clone(),
            flush: flush.clone(),
            revs,
            batch_size: settings.batch_size,
        };

        let push_task = tokio::spawn(push_loop(push_ctx, shutdown_rx.clone()));
        let pull_task = tokio::spawn(pull_loop(
            pull_ctx,
            settings.longpoll_timeout,
            shutdown_rx,
        ));

        state_tx.send_replace(SessionState::Active);
        info!(collection, remote_url, "Replication session started");

        Ok(ReplicationSession {
            collection: collection.to_string(),
            remote_url: remote_url.to_string(),
            state_rx,
            state_tx,
            shutdown_tx,
            push_task: Some(push_task),
            pull_task: Some(pull_task),
            flush,
        })
    }

    /// Collection this session replicates.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Remote base URL this session talks to.
    pub fn remote_url(&self) -> &str {
        &self.remote_url
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Subscribes to session state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// True while the session counts as running (Active or Errored).
    pub fn is_live(&self) -> bool {
        matches!(self.state(), SessionState::Active | SessionState::Errored)
    }

    /// Stops the session: cancels both channels and the pending flush
    /// timer. Cancellation is cooperative - in-flight transfers finish or
    /// are dropped at their next suspension point.
    ///
    /// Safe to call repeatedly; stopping a stopped session is a no-op.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);

        if let Some(task) = self.push_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.pull_task.take() {
            let _ = task.await;
        }

        // After the channels are gone nothing can re-arm the timer.
        self.flush.cancel();

        if self.state() != SessionState::Stopped {
            self.state_tx.send_replace(SessionState::Stopped);
            info!(collection = %self.collection, "Replication session stopped");
        }
    }
}

// =============================================================================
// Push Channel
// =============================================================================

/// Drains the local change log into the remote, batch by batch.
async fn push_loop(ctx: ChannelContext, mut shutdown: watch::Receiver<bool>) {
    debug!(collection = %ctx.collection, "Push channel open");
    let mut cursor = 0u64;
    let signal = ctx.raw.change_signal();

    loop {
        if *shutdown.borrow() {
            break;
        }

        // Arm the wakeup BEFORE reading the log so a mutation in between
        // cannot be missed.
        let notified = signal.notified();

        let (changes, next_cursor) = ctx.raw.changes_since(cursor, ctx.batch_size);
        if changes.is_empty() {
            tokio::select! {
                _ = notified => continue,
                _ = shutdown.changed() => break,
            }
        }

        let mut docs: Vec<Value> = Vec::new();
        for change in &changes {
            // Changes applied FROM the remote are never echoed back.
            if change.replicated {
                continue;
            }

            if change.deleted {
                let known_rev = ctx.revs.lock().unwrap().get(&change.id).cloned();
                if let Some(rev) = known_rev {
                    docs.push(json!({ "_id": change.id, "_rev": rev, "_deleted": true }));
                }
                // A document the remote never saw needs no tombstone.
            } else if let Some(mut value) = ctx.raw.value_of(&change.id) {
                if let Some(obj) = value.as_object_mut() {
                    obj.insert("_id".to_string(), Value::String(change.id.clone()));
                    let known_rev = ctx.revs.lock().unwrap().get(&change.id).cloned();
                    if let Some(rev) = known_rev {
                        obj.insert("_rev".to_string(), Value::String(rev));
                    }
                }
                docs.push(value);
            }
        }

        if docs.is_empty() {
            cursor = next_cursor;
            continue;
        }

        match ctx
            .client
            .bulk_docs(&ctx.remote_url, &ctx.collection, &docs)
            .await
        {
            Ok(statuses) => {
                cursor = next_cursor;
                let mut accepted = 0;
                for status in statuses {
                    if status.accepted() {
                        accepted += 1;
                        if let (Some(id), Some(rev)) = (status.id, status.rev) {
                            ctx.revs.lock().unwrap().insert(id, rev);
                        }
                    } else {
                        // Conflict resolution belongs to the remote's merge
                        // policy; the pull channel converges us afterwards.
                        warn!(
                            collection = %ctx.collection,
                            id = status.id.as_deref().unwrap_or("?"),
                            error = status.error.as_deref().unwrap_or("rejected"),
                            "Remote rejected document"
                        );
                    }
                }
                debug!(collection = %ctx.collection, accepted, "Pushed batch");
                ctx.flush.schedule();
            }
            Err(e) => {
                warn!(collection = %ctx.collection, error = %e, "Push channel transport error");
                ctx.state.send_replace(SessionState::Errored);
                // The session stays alive but this channel goes quiet;
                // there is no retry loop at this layer.
                let _ = shutdown.changed().await;
                break;
            }
        }
    }

    debug!(collection = %ctx.collection, "Push channel closed");
}

// =============================================================================
// Pull Channel
// =============================================================================

/// Long-polls the remote change feed and applies documents locally.
async fn pull_loop(
    ctx: ChannelContext,
    longpoll_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(collection = %ctx.collection, "Pull channel open");
    let mut since = "0".to_string();

    loop {
        tokio::select! {
            result = ctx.client.changes(
                &ctx.remote_url,
                &ctx.collection,
                &since,
                ctx.batch_size,
                longpoll_timeout,
            ) => {
                match result {
                    Ok(batch) => {
                        since = batch.last_seq.clone();

                        let mut applied = 0;
                        for row in batch.rows {
                            if row.deleted {
                                ctx.revs.lock().unwrap().remove(&row.id);
                                if ctx.raw.remove_replicated(&row.id) {
                                    applied += 1;
                                }
                            } else if let Some(doc) = row.doc {
                                if let Some(rev) = doc.get("_rev").and_then(Value::as_str) {
                                    ctx.revs
                                        .lock()
                                        .unwrap()
                                        .insert(row.id.clone(), rev.to_string());
                                }
                                match ctx.raw.apply_replicated(doc) {
                                    Ok(()) => applied += 1,
                                    Err(e) => warn!(
                                        collection = %ctx.collection,
                                        id = %row.id,
                                        error = %e,
                                        "Skipping invalid replicated document"
                                    ),
                                }
                            }
                        }

                        if applied > 0 {
                            debug!(collection = %ctx.collection, applied, "Pulled batch");
                            ctx.flush.schedule();
                        }
                    }
                    Err(e) => {
                        warn!(collection = %ctx.collection, error = %e, "Pull channel transport error");
                        ctx.state.send_replace(SessionState::Errored);
                        let _ = shutdown.changed().await;
                        break;
                    }
                }
            }

            _ = shutdown.changed() => break,
        }
    }

    debug!(collection = %ctx.collection, "Pull channel closed");
}

// =============================================================================
// Unit Tests
// =============================================================================
