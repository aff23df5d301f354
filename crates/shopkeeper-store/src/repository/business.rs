//! # Business Repository
//!
//! CRUD operations for businesses.

use std::sync::Arc;

use tracing::{debug, warn};

use shopkeeper_core::{Business, BUSINESSES_COLLECTION};

use crate::error::StoreResult;
use crate::local::Collection;
use crate::synchronizer::ConsistencySynchronizer;

/// Repository for business documents.
///
/// ## Usage
/// ```rust,ignore
/// let repo = store.businesses();
///
/// repo.add(Business::with_id("b1", "Acme")).await?;
/// let business = repo.get_by_id("b1");
/// ```
#[derive(Clone)]
pub struct BusinessRepository {
    collection: Arc<Collection<Business>>,
    synchronizer: ConsistencySynchronizer,
}

impl BusinessRepository {
    /// Creates a new BusinessRepository.
    pub fn new(
        collection: Arc<Collection<Business>>,
        synchronizer: ConsistencySynchronizer,
    ) -> Self {
        BusinessRepository {
            collection,
            synchronizer,
        }
    }

    /// Adds a new business.
    ///
    /// ## Returns
    /// * `Ok(Business)` - inserted document, now durable-cached (best effort)
    /// * `Err` - duplicate id or failed validation; nothing was stored
    pub async fn add(&self, business: Business) -> StoreResult<Business> {
        debug!(id = %business.id, "Adding business");
        self.collection.insert(business.clone())?;
        self.reconcile_after_mutation().await;
        Ok(business)
    }

    /// Updates an existing business, keyed by its id.
    ///
    /// Applying the same payload twice yields the same stored state.
    pub async fn update(&self, business: Business) -> StoreResult<()> {
        debug!(id = %business.id, "Updating business");
        self.collection.update(business)?;
        self.reconcile_after_mutation().await;
        Ok(())
    }

    /// Deletes a business by id.
    ///
    /// ## Returns
    /// * `Ok(true)` - the business existed and was removed
    /// * `Ok(false)` - no such id; deleting a nonexistent business is NOT
    ///   an error
    pub async fn delete(&self, id: &str) -> StoreResult<bool> {
        debug!(id, "Deleting business");
        match self.collection.remove(id) {
            Ok(_) => {
                self.reconcile_after_mutation().await;
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns a business by id. Reads only the Local Store.
    pub fn get_by_id(&self, id: &str) -> Option<Business> {
        self.collection.get(id)
    }

    /// Returns every business, ordered by id.
    pub fn all(&self) -> Vec<Business> {
        self.collection.all()
    }

    /// Counts businesses (for diagnostics).
    pub fn count(&self) -> usize {
        self.collection.len()
    }

    /// Step 2 of the mutation contract: flush the collection, log on
    /// failure, never roll back.
    async fn reconcile_after_mutation(&self) {
        if let Err(e) = self.synchronizer.reconcile(BUSINESSES_COLLECTION).await {
            warn!(
                collection = BUSINESSES_COLLECTION,
                error = %e,
                "Durable flush failed; cache lags the Local Store"
            );
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
