//! # Connectivity Monitor
//!
//! Tracks the device's online/offline state and publishes EDGE-TRIGGERED
//! transitions. The platform's actual network detection lives outside this
//! subsystem; whatever detects it feeds a boolean in via [`set_online`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Connectivity Monitor                                │
//! │                                                                         │
//! │  platform signal ──► set_online(bool)                                  │
//! │                           │                                             │
//! │                           ▼ (send_if_modified: only real edges)         │
//! │                     watch channel ──► subscribers                       │
//! │                                                                         │
//! │  offline → online : discovery, then session start (SyncController)      │
//! │  online → offline : immediate session stop, no drain                    │
//! │  online → online  : NOT published (same-state notifications dropped)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`set_online`]: ConnectivityMonitor::set_online

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

/// Shared handle over the connectivity state.
///
/// Cheap to clone; all clones feed and observe the same channel.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    state: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    /// Creates a monitor with the given initial state.
    ///
    /// The initial state is NOT an edge: subscribers only wake on later
    /// transitions.
    pub fn new(initially_online: bool) -> Self {
        let (tx, _) = watch::channel(initially_online);
        ConnectivityMonitor {
            state: Arc::new(tx),
        }
    }

    /// Returns the current online state.
    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Feeds a new observation from the platform signal.
    ///
    /// Returns true when this was a real transition. Repeated same-state
    /// observations are dropped and never reach subscribers.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if *state != online {
                *state = online;
                true
            } else {
                false
            }
        });

        if changed {
            debug!(online, "Connectivity transition");
        }
        changed
    }

    /// Subscribes to transitions.
    ///
    /// The receiver wakes once per edge; coalesced rapid flip-flops
    /// resolve to the latest state.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
