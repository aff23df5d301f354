//! # Article Repository
//!
//! CRUD operations for articles, plus the foreign-key lookup the screens
//! live on: all articles of one business.
//!
//! The `business_id` reference is soft. Adding an article whose business is
//! gone succeeds; deleting a business leaves its articles orphaned. Both
//! states are tolerated by design - the remote's merge policy can produce
//! them anyway when two offline devices diverge.

use std::sync::Arc;

use tracing::{debug, warn};

use shopkeeper_core::{Article, ARTICLES_COLLECTION};

use crate::error::StoreResult;
use crate::local::Collection;
use crate::synchronizer::ConsistencySynchronizer;

/// Repository for article documents.
#[derive(Clone)]
pub struct ArticleRepository {
    collection: Arc<Collection<Article>>,
    synchronizer: ConsistencySynchronizer,
}

impl ArticleRepository {
    /// Creates a new ArticleRepository.
    pub fn new(
        collection: Arc<Collection<Article>>,
        synchronizer: ConsistencySynchronizer,
    ) -> Self {
        ArticleRepository {
            collection,
            synchronizer,
        }
    }

    /// Adds a new article.
    pub async fn add(&self, article: Article) -> StoreResult<Article> {
        debug!(id = %article.id, business_id = %article.business_id, "Adding article");
        self.collection.insert(article.clone())?;
        self.reconcile_after_mutation().await;
        Ok(article)
    }

    /// Updates an existing article, keyed by its id.
    pub async fn update(&self, article: Article) -> StoreResult<()> {
        debug!(id = %article.id, "Updating article");
        self.collection.update(article)?;
        self.reconcile_after_mutation().await;
        Ok(())
    }

    /// Deletes an article by id. Deleting a nonexistent id returns
    /// `Ok(false)`, never an error.
    pub async fn delete(&self, id: &str) -> StoreResult<bool> {
        debug!(id, "Deleting article");
        match self.collection.remove(id) {
            Ok(_) => {
                self.reconcile_after_mutation().await;
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns an article by id. Reads only the Local Store.
    pub fn get_by_id(&self, id: &str) -> Option<Article> {
        self.collection.get(id)
    }

    /// Returns all articles belonging to one business, ordered by id.
    /// Reads only the Local Store.
    pub fn find_by_business(&self, business_id: &str) -> Vec<Article> {
        self.collection
            .find_where(|article| article.business_id == business_id)
    }

    /// Returns every article, ordered by id.
    pub fn all(&self) -> Vec<Article> {
        self.collection.all()
    }

    /// Counts articles (for diagnostics).
    pub fn count(&self) -> usize {
        self.collection.len()
    }

    async fn reconcile_after_mutation(&self) {
        if let Err(e) = self.synchronizer.reconcile(ARTICLES_COLLECTION).await {
            warn!(
                collection = ARTICLES_COLLECTION,
                error = %e,
                "Durable flush failed; cache lags the Local Store"
            );
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, DurableCache};
    use crate::local::LocalStore;
    use shopkeeper_core::Business;

    async fn repos() -> (super::super::BusinessRepository, ArticleRepository) {
        let local = Arc::new(LocalStore::new());
        let cache = DurableCache::open(CacheConfig::in_memory()).await.unwrap();
        let synchronizer = ConsistencySynchronizer::new(local.clone(), cache);
        (
            super::super::BusinessRepository::new(local.businesses(), synchronizer.clone()),
            ArticleRepository::new(local.articles(), synchronizer),
        )
    }

    #[tokio::test]
    async fn test_find_by_business_returns_exactly_the_owned_articles() {
        let (businesses, articles) = repos().await;

        businesses
            .add(Business::with_id("b1", "Acme"))
            .await
            .unwrap();
        articles
            .add(Article::with_id("a1", "Widget", 5, 9.99, "b1"))
            .await
            .unwrap();
        articles
            .add(Article::with_id("a2", "Gadget", 2, 3.50, "b2"))
            .await
            .unwrap();

        let found = articles.find_by_business("b1");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a1");
    }

    #[tokio::test]
    async fn test_orphaned_articles_are_tolerated() {
        let (businesses, articles) = repos().await;

        businesses
            .add(Business::with_id("b1", "Acme"))
            .await
            .unwrap();
        articles
            .add(Article::with_id("a1", "Widget", 5, 9.99, "b1"))
            .await
            .unwrap();

        // Deleting the business leaves the article behind.
        assert!(businesses.delete("b1").await.unwrap());
        assert_eq!(articles.find_by_business("b1").len(), 1);

        // Adding an article for a business that never existed also works.
        articles
            .add(Article::with_id("a2", "Stray", 1, 1.0, "ghost"))
            .await
            .unwrap();
        assert_eq!(articles.count(), 2);
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_falsy() {
        let (_, articles) = repos().await;
        assert!(!articles.delete("missing").await.unwrap());
    }
}
