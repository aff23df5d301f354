//! # Local Store
//!
//! In-memory, schema-validated, queryable document collections. The Local
//! Store is the system of record for reads; the Durable Cache and the remote
//! replica both trail it.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Local Store                                     │
//! │                                                                         │
//! │   CRUD (typed)                     Replication (raw JSON)              │
//! │   ────────────                     ──────────────────────              │
//! │   insert / update / remove        apply_replicated / remove_replicated │
//! │        │                                   │                            │
//! │        ▼                                   ▼                            │
//! │   ┌─────────────────────────────────────────────────────┐              │
//! │   │  Collection<T>                                      │              │
//! │   │                                                     │              │
//! │   │  docs: BTreeMap<id, T>     (validated documents)    │              │
//! │   │  changes: Vec<Change>      (one entry per id)       │              │
//! │   │  signal: Notify            (wakes push channels)    │              │
//! │   └─────────────────────────────────────────────────────┘              │
//! │                                                                         │
//! │   Every mutation appends to the change log. The push channel drains    │
//! │   the log by sequence number; entries applied FROM the remote are      │
//! │   flagged so they are never echoed back out.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Critical sections are short and never held across an await point, so a
//! plain `std::sync::RwLock` is enough here; all suspension happens at
//! network and durable-storage boundaries, not inside the Local Store.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Notify;

use shopkeeper_core::error::ValidationError;
use shopkeeper_core::{
    validation, Article, Business, CoreError, CoreResult, ARTICLES_COLLECTION,
    BUSINESSES_COLLECTION,
};

// =============================================================================
// Document Trait
// =============================================================================

/// A document type stored in a Local Store collection.
///
/// Ties a Rust type to its collection name and schema rules. The id is the
/// primary key: unique per collection and immutable once created.
pub trait Document:
    Clone + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Entity name used in error messages (e.g. "Business").
    const ENTITY: &'static str;

    /// Collection this type lives in, locally and on the remote.
    const COLLECTION: &'static str;

    /// Returns the primary key.
    fn id(&self) -> &str;

    /// Validates the document against the collection schema.
    fn validate(&self) -> Result<(), ValidationError>;
}

impl Document for Business {
    const ENTITY: &'static str = "Business";
    const COLLECTION: &'static str = BUSINESSES_COLLECTION;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_business(self)
    }
}

impl Document for Article {
    const ENTITY: &'static str = "Article";
    const COLLECTION: &'static str = ARTICLES_COLLECTION;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_article(self)
    }
}

// =============================================================================
// Change Log
// =============================================================================

/// A change-log entry describing one mutation.
///
/// The log keeps only the LATEST entry per id (like a collapsed change
/// feed), so its size is bounded by the number of live ids plus tombstones.
#[derive(Debug, Clone)]
pub struct Change {
    /// Monotonic per-collection sequence number.
    pub seq: u64,

    /// Id of the mutated document.
    pub id: String,

    /// True when the mutation was a removal (tombstone).
    pub deleted: bool,

    /// True when the mutation was applied FROM the remote replica.
    /// Push channels skip these entries to avoid echoing documents back.
    pub replicated: bool,
}

// =============================================================================
// Collection
// =============================================================================

struct CollectionInner<T> {
    docs: BTreeMap<String, T>,
    changes: Vec<Change>,
    seq: u64,
}

/// One in-memory collection of schema-validated documents.
pub struct Collection<T: Document> {
    inner: RwLock<CollectionInner<T>>,
    signal: Arc<Notify>,
}

impl<T: Document> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Document> Collection<T> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Collection {
            inner: RwLock::new(CollectionInner {
                docs: BTreeMap::new(),
                changes: Vec::new(),
                seq: 0,
            }),
            signal: Arc::new(Notify::new()),
        }
    }

    /// Inserts a new document.
    ///
    /// ## Returns
    /// * `Err(CoreError::AlreadyExists)` - the id is already taken
    /// * `Err(CoreError::Validation)` - the document fails schema rules
    pub fn insert(&self, doc: T) -> CoreResult<()> {
        self.insert_with_origin(doc, false)
    }

    /// Replaces an existing document, keyed by its id.
    ///
    /// The id is immutable: there is no way to rename a document, only to
    /// replace the fields stored under its id.
    pub fn update(&self, doc: T) -> CoreResult<()> {
        doc.validate().map_err(CoreError::Validation)?;

        let mut inner = self.inner.write().unwrap();
        if !inner.docs.contains_key(doc.id()) {
            return Err(CoreError::not_found(T::ENTITY, doc.id()));
        }
        let id = doc.id().to_string();
        inner.docs.insert(id.clone(), doc);
        record_change(&mut inner, id, false, false);
        drop(inner);

        self.signal.notify_waiters();
        Ok(())
    }

    /// Removes a document and returns it.
    pub fn remove(&self, id: &str) -> CoreResult<T> {
        let mut inner = self.inner.write().unwrap();
        let Some(doc) = inner.docs.remove(id) else {
            return Err(CoreError::not_found(T::ENTITY, id));
        };
        record_change(&mut inner, id.to_string(), true, false);
        drop(inner);

        self.signal.notify_waiters();
        Ok(doc)
    }

    /// Returns a document by id, or None.
    pub fn get(&self, id: &str) -> Option<T> {
        self.inner.read().unwrap().docs.get(id).cloned()
    }

    /// Returns all documents matching a predicate.
    pub fn find_where(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.inner
            .read()
            .unwrap()
            .docs
            .values()
            .filter(|doc| predicate(doc))
            .cloned()
            .collect()
    }

    /// Returns all documents, ordered by id.
    pub fn all(&self) -> Vec<T> {
        self.inner.read().unwrap().docs.values().cloned().collect()
    }

    /// Returns the number of documents.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().docs.len()
    }

    /// Returns true when the collection holds no documents.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_with_origin(&self, doc: T, replicated: bool) -> CoreResult<()> {
        doc.validate().map_err(CoreError::Validation)?;

        let mut inner = self.inner.write().unwrap();
        if inner.docs.contains_key(doc.id()) {
            return Err(CoreError::already_exists(T::ENTITY, doc.id()));
        }
        let id = doc.id().to_string();
        inner.docs.insert(id.clone(), doc);
        record_change(&mut inner, id, false, replicated);
        drop(inner);

        self.signal.notify_waiters();
        Ok(())
    }

    fn upsert_replicated(&self, doc: T) -> CoreResult<()> {
        doc.validate().map_err(CoreError::Validation)?;

        let mut inner = self.inner.write().unwrap();
        let id = doc.id().to_string();
        inner.docs.insert(id.clone(), doc);
        record_change(&mut inner, id, false, true);
        drop(inner);

        self.signal.notify_waiters();
        Ok(())
    }
}

/// Appends a change entry, collapsing any earlier entry for the same id.
fn record_change<T>(inner: &mut CollectionInner<T>, id: String, deleted: bool, replicated: bool) {
    inner.seq += 1;
    let seq = inner.seq;
    inner.changes.retain(|c| c.id != id);
    inner.changes.push(Change {
        seq,
        id,
        deleted,
        replicated,
    });
}

// =============================================================================
// Raw Collection Seam
// =============================================================================

/// Collection access by name, with JSON document bodies.
///
/// This is the seam the replication layer works through: it addresses
/// collections by name and moves documents as raw JSON, while every write
/// still passes the typed schema validation underneath.
pub trait RawCollection: Send + Sync {
    /// Collection name.
    fn name(&self) -> &'static str;

    /// Entity name for error messages.
    fn entity(&self) -> &'static str;

    /// Inserts a document from its JSON body. Fails with a typed
    /// AlreadyExists when the id is taken (callers reloading a snapshot
    /// swallow that variant).
    fn insert_value(&self, value: Value) -> CoreResult<()>;

    /// Upserts a document received from the remote replica.
    /// Accepts `_id` as an id fallback and ignores replication metadata.
    fn apply_replicated(&self, value: Value) -> CoreResult<()>;

    /// Removes a document deleted on the remote replica.
    /// Returns false when the id was already absent.
    fn remove_replicated(&self, id: &str) -> bool;

    /// Serializes every document, ordered by id.
    fn to_values(&self) -> Vec<Value>;

    /// Serializes one document by id.
    fn value_of(&self, id: &str) -> Option<Value>;

    /// Returns change-log entries with `seq > cursor`, up to `limit`, and
    /// the cursor to resume from.
    fn changes_since(&self, cursor: u64, limit: usize) -> (Vec<Change>, u64);

    /// Current change-log high-water mark.
    fn last_seq(&self) -> u64;

    /// Signal fired after every mutation (used by push channels).
    fn change_signal(&self) -> Arc<Notify>;

    /// Number of documents.
    fn len(&self) -> usize;

    /// Drops every document and the change log.
    fn clear(&self);
}

impl<T: Document> RawCollection for Collection<T> {
    fn name(&self) -> &'static str {
        T::COLLECTION
    }

    fn entity(&self) -> &'static str {
        T::ENTITY
    }

    fn insert_value(&self, value: Value) -> CoreResult<()> {
        let doc = decode_document::<T>(value)?;
        self.insert_with_origin(doc, false)
    }

    fn apply_replicated(&self, value: Value) -> CoreResult<()> {
        let doc = decode_document::<T>(value)?;
        self.upsert_replicated(doc)
    }

    fn remove_replicated(&self, id: &str) -> bool {
        let mut inner = self.inner.write().unwrap();
        if inner.docs.remove(id).is_none() {
            return false;
        }
        record_change(&mut inner, id.to_string(), true, true);
        drop(inner);

        self.signal.notify_waiters();
        true
    }

    fn to_values(&self) -> Vec<Value> {
        let inner = self.inner.read().unwrap();
        inner
            .docs
            .values()
            .filter_map(|doc| serde_json::to_value(doc).ok())
            .collect()
    }

    fn value_of(&self, id: &str) -> Option<Value> {
        let inner = self.inner.read().unwrap();
        inner
            .docs
            .get(id)
            .and_then(|doc| serde_json::to_value(doc).ok())
    }

    fn changes_since(&self, cursor: u64, limit: usize) -> (Vec<Change>, u64) {
        let inner = self.inner.read().unwrap();
        let batch: Vec<Change> = inner
            .changes
            .iter()
            .filter(|c| c.seq > cursor)
            .take(limit)
            .cloned()
            .collect();
        let next = batch.last().map(|c| c.seq).unwrap_or(cursor);
        (batch, next)
    }

    fn last_seq(&self) -> u64 {
        self.inner.read().unwrap().seq
    }

    fn change_signal(&self) -> Arc<Notify> {
        self.signal.clone()
    }

    fn len(&self) -> usize {
        Collection::len(self)
    }

    fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.docs.clear();
        inner.changes.clear();
    }
}

/// Decodes a JSON body into a typed document.
///
/// Replicated documents may carry remote metadata (`_id`, `_rev`); the id
/// falls back to `_id` when the body has none of its own.
fn decode_document<T: Document>(mut value: Value) -> CoreResult<T> {
    if let Some(obj) = value.as_object_mut() {
        if !obj.contains_key("id") {
            if let Some(remote_id) = obj.get("_id").cloned() {
                obj.insert("id".to_string(), remote_id);
            }
        }
    }

    serde_json::from_value(value).map_err(|e| {
        CoreError::Validation(ValidationError::Malformed {
            reason: e.to_string(),
        })
    })
}

// =============================================================================
// Local Store
// =============================================================================

/// The in-memory store holding every collection.
///
/// Created once at startup and passed by reference into every operation;
/// there is deliberately no global instance, which also gives each test an
/// isolated store.
pub struct LocalStore {
    businesses: Arc<Collection<Business>>,
    articles: Arc<Collection<Article>>,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore {
    /// Creates an empty Local Store with both collections registered.
    pub fn new() -> Self {
        LocalStore {
            businesses: Arc::new(Collection::new()),
            articles: Arc::new(Collection::new()),
        }
    }

    /// Typed access to the businesses collection.
    pub fn businesses(&self) -> Arc<Collection<Business>> {
        self.businesses.clone()
    }

    /// Typed access to the articles collection.
    pub fn articles(&self) -> Arc<Collection<Article>> {
        self.articles.clone()
    }

    /// Name-addressed access for the replication layer.
    pub fn collection(&self, name: &str) -> Option<Arc<dyn RawCollection>> {
        match name {
            BUSINESSES_COLLECTION => Some(self.businesses.clone() as Arc<dyn RawCollection>),
            ARTICLES_COLLECTION => Some(self.articles.clone() as Arc<dyn RawCollection>),
            _ => None,
        }
    }

    /// All registered collection names, in boot-load order.
    pub fn collection_names() -> [&'static str; 2] {
        [BUSINESSES_COLLECTION, ARTICLES_COLLECTION]
    }

    /// Drops every document in every collection.
    pub fn clear_all(&self) {
        for name in Self::collection_names() {
            if let Some(collection) = self.collection(name) {
                collection.clear();
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
