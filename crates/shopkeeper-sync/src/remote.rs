//! # Remote Client
//!
//! Thin HTTP client over the remote replica's surface. Plain HTTP with
//! Basic authentication on EVERY request; the remote's internal
//! replication/merge machinery is consumed only through these endpoints:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Remote HTTP Surface                                 │
//! │                                                                         │
//! │  GET    /                         health probe (discovery)             │
//! │  GET    /<collection>/            existence check (trailing slash)     │
//! │  PUT    /<collection>             create; 412 = already exists = ok    │
//! │  DELETE /<collection>             remove                               │
//! │  GET    /<collection>/_all_docs   { total_rows } emptiness check       │
//! │  GET    /<collection>/_changes    long-poll pull channel               │
//! │  POST   /<collection>/_bulk_docs  bulk-submit push channel             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// URL Helpers
// =============================================================================

/// `<base>/<collection>` - create/delete target (no trailing slash).
pub(crate) fn collection_url(base: &str, collection: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), collection)
}

/// `<base>/<collection>/` - existence check target (trailing slash
/// required by the remote).
pub(crate) fn collection_root_url(base: &str, collection: &str) -> String {
    format!("{}/{}/", base.trim_end_matches('/'), collection)
}

/// Normalizes a change-feed sequence token to a string.
/// Older remotes send numbers, newer ones send opaque strings.
fn seq_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "0".to_string(),
        other => other.to_string(),
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ChangesEnvelope {
    #[serde(default)]
    results: Vec<ChangeRow>,
    #[serde(default)]
    last_seq: Value,
}

/// One row of the remote change feed.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeRow {
    /// Document id.
    pub id: String,

    /// True when the change is a deletion (tombstone).
    #[serde(default)]
    pub deleted: bool,

    /// Document body (present because the feed is requested with
    /// `include_docs=true`). Carries `_id` / `_rev` metadata.
    #[serde(default)]
    pub doc: Option<Value>,
}

/// One batch pulled from the change feed.
#[derive(Debug)]
pub struct ChangesBatch {
    /// Changed documents, oldest first.
    pub rows: Vec<ChangeRow>,

    /// Sequence token to resume the feed from.
    pub last_seq: String,
}

#[derive(Debug, Deserialize)]
struct AllDocsEnvelope {
    total_rows: u64,
}

/// Per-document status from a bulk submit.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkDocStatus {
    /// Document id.
    #[serde(default)]
    pub id: Option<String>,

    /// Present and true when the document was accepted.
    #[serde(default)]
    pub ok: Option<bool>,

    /// New revision after acceptance.
    #[serde(default)]
    pub rev: Option<String>,

    /// Error tag (e.g. "conflict") when rejected.
    #[serde(default)]
    pub error: Option<String>,

    /// Error detail when rejected.
    #[serde(default)]
    pub reason: Option<String>,
}

impl BulkDocStatus {
    /// True when the remote accepted this document.
    pub fn accepted(&self) -> bool {
        self.ok.unwrap_or(false) && self.error.is_none()
    }
}

// =============================================================================
// Remote Client
// =============================================================================

/// HTTP client for the remote replica. Cheap to clone.
#[derive(Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    username: String,
    password: String,
    probe_timeout: Duration,
}

impl RemoteClient {
    /// Creates a client with the given Basic-auth credentials.
    ///
    /// Every request gets a default timeout; the long-poll change feed
    /// overrides it per request to leave the remote room to answer.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        probe_timeout: Duration,
    ) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        Ok(RemoteClient {
            http,
            username: username.into(),
            password: password.into(),
            probe_timeout,
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
    }

    /// Sends a bounded-timeout authenticated health probe to the endpoint
    /// root. Any transport failure or non-success status counts as an
    /// unhealthy endpoint; the caller decides whether to move on.
    pub async fn probe(&self, base_url: &str) -> bool {
        let url = format!("{}/", base_url.trim_end_matches('/'));
        match self.get(&url).timeout(self.probe_timeout).send().await {
            Ok(response) => {
                let healthy = response.status().is_success();
                debug!(url = %url, status = %response.status(), healthy, "Probed endpoint");
                healthy
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Probe failed");
                false
            }
        }
    }

    /// Checks whether a remote collection exists.
    ///
    /// ## Returns
    /// * `Ok(true)` - the existence GET returned success
    /// * `Ok(false)` - the remote answered, but not with success
    /// * `Err` - the remote could not be reached at all
    pub async fn collection_exists(&self, base_url: &str, collection: &str) -> SyncResult<bool> {
        let url = collection_root_url(base_url, collection);
        let response = self.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    /// Creates a remote collection. HTTP 412 means the collection already
    /// exists and is treated as success.
    pub async fn create_collection(&self, base_url: &str, collection: &str) -> SyncResult<()> {
        let url = collection_url(base_url, collection);
        let response = self
            .http
            .put(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::PRECONDITION_FAILED {
            debug!(url = %url, status = %status, "Remote collection ensured");
            Ok(())
        } else {
            Err(SyncError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            })
        }
    }

    /// Deletes a remote collection. A missing collection (404) is fine.
    pub async fn delete_collection(&self, base_url: &str, collection: &str) -> SyncResult<()> {
        let url = collection_url(base_url, collection);
        let response = self
            .http
            .delete(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            debug!(url = %url, status = %status, "Remote collection deleted");
            Ok(())
        } else {
            Err(SyncError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            })
        }
    }

    /// Returns the remote collection's `total_rows` (emptiness check).
    pub async fn total_rows(&self, base_url: &str, collection: &str) -> SyncResult<u64> {
        let url = format!("{}_all_docs", collection_root_url(base_url, collection));
        let response = self.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        let envelope: AllDocsEnvelope = response.json().await?;
        Ok(envelope.total_rows)
    }

    /// Long-polls the remote change feed.
    ///
    /// Returns as soon as there is at least one change past `since`, or
    /// empty after `wait` elapses with nothing new. `limit` bounds the
    /// batch.
    pub async fn changes(
        &self,
        base_url: &str,
        collection: &str,
        since: &str,
        limit: usize,
        wait: Duration,
    ) -> SyncResult<ChangesBatch> {
        let url = format!("{}_changes", collection_root_url(base_url, collection));
        let response = self
            .get(&url)
            .query(&[
                ("feed", "longpoll".to_string()),
                ("include_docs", "true".to_string()),
                ("since", since.to_string()),
                ("limit", limit.to_string()),
                ("timeout", wait.as_millis().to_string()),
            ])
            // Leave the remote room to answer the long poll before the
            // transport gives up.
            .timeout(wait + Duration::from_secs(10))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        let envelope: ChangesEnvelope = response.json().await?;
        Ok(ChangesBatch {
            rows: envelope.results,
            last_seq: seq_string(&envelope.last_seq),
        })
    }

    /// Bulk-submits a batch of documents to the remote collection.
    /// Returns one status row per submitted document.
    pub async fn bulk_docs(
        &self,
        base_url: &str,
        collection: &str,
        docs: &[Value],
    ) -> SyncResult<Vec<BulkDocStatus>> {
        let url = format!("{}_bulk_docs", collection_root_url(base_url, collection));
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&json!({ "docs": docs }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        let rows: Vec<BulkDocStatus> = response.json().await?;
        Ok(rows)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
