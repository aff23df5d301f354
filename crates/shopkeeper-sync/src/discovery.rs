//! # Endpoint Discovery
//!
//! Finds a reachable remote replica endpoint from a prioritized candidate
//! list, preferring the last URL that worked.
//!
//! ## Discovery Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Endpoint Discovery                                  │
//! │                                                                         │
//! │  discover()                                                             │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  last-good URL persisted? ──yes──► probe it ──healthy──► return it      │
//! │      │ no                             │ unhealthy                       │
//! │      ▼                                ▼                                 │
//! │  for candidate in configured order:                                     │
//! │      probe(candidate)  ── bounded timeout, SEQUENTIAL ──                │
//! │      first success ──► persist as last-good ──► return it               │
//! │      │                                                                  │
//! │      ▼ none answered                                                    │
//! │  NoEndpointAvailable                                                    │
//! │                                                                         │
//! │  No parallel probing: first-match-wins keeps low-bandwidth links        │
//! │  from being flooded. A timed-out probe is a failure, not retried        │
//! │  within the same call.                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tracing::{debug, info, warn};

use shopkeeper_store::DurableCache;

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteClient;

/// Discovers a reachable endpoint from the candidate list.
#[derive(Clone)]
pub struct EndpointDiscovery {
    candidates: Vec<String>,
    client: RemoteClient,
    cache: DurableCache,
}

impl EndpointDiscovery {
    /// Creates a discovery over the given ordered candidate list.
    ///
    /// The Durable Cache holds the persisted last-good URL between runs.
    pub fn new(candidates: Vec<String>, client: RemoteClient, cache: DurableCache) -> Self {
        EndpointDiscovery {
            candidates,
            client,
            cache,
        }
    }

    /// Resolves a reachable endpoint URL.
    ///
    /// ## Returns
    /// * `Ok(url)` - the first candidate that answered the health probe;
    ///   also persisted as the new last-good URL
    /// * `Err(SyncError::NoEndpointAvailable)` - nothing answered
    pub async fn discover(&self) -> SyncResult<String> {
        // Previously successful endpoint first.
        if let Some(last_good) = self.read_last_good().await {
            debug!(url = %last_good, "Probing last-good endpoint first");
            if self.client.probe(&last_good).await {
                info!(url = %last_good, "Last-good endpoint still healthy");
                return Ok(last_good);
            }
            debug!(url = %last_good, "Last-good endpoint no longer answers");
        }

        // Candidate list in configured priority order, sequentially.
        for candidate in &self.candidates {
            if self.client.probe(candidate).await {
                info!(url = %candidate, "Discovered endpoint");
                self.persist_last_good(candidate).await;
                return Ok(candidate.clone());
            }
        }

        warn!(
            probed = self.candidates.len(),
            "No candidate endpoint answered"
        );
        Err(SyncError::NoEndpointAvailable {
            probed: self.candidates.len(),
        })
    }

    async fn read_last_good(&self) -> Option<String> {
        match self.cache.last_good_url().await {
            Ok(url) => url,
            Err(e) => {
                // A cache read failure only costs us the shortcut.
                warn!(error = %e, "Could not read last-good endpoint");
                None
            }
        }
    }

    async fn persist_last_good(&self, url: &str) {
        if let Err(e) = self.cache.set_last_good_url(url).await {
            warn!(error = %e, "Could not persist last-good endpoint");
        }
    }
}
