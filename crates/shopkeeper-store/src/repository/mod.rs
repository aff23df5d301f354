//! # Repositories
//!
//! CRUD surfaces over the Local Store. Every mutation follows the same
//! three-step contract:
//!
//! 1. Mutate the Local Store - failure here aborts the whole operation and
//!    propagates to the caller.
//! 2. Synchronously reconcile the collection into the Durable Cache -
//!    failure here is LOGGED but never rolls back step 1 (the cache may lag
//!    behind the Local Store; accepted, not corrected automatically).
//! 3. Nothing else: a live replication session picks the mutation up from
//!    the change log through its own push channel.
//!
//! Lookups read ONLY from the Local Store, never from the Durable Cache or
//! the remote.

pub mod article;
pub mod business;

pub use article::ArticleRepository;
pub use business::BusinessRepository;
