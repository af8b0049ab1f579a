//! Storage collaborators used by the import pipeline
//!
//! The pipeline never talks to a database directly. It writes products through
//! a [`ProductStore`] and records job progress through a [`JobRepository`].
//! Both have in-memory implementations and, behind the `database` feature,
//! PostgreSQL implementations.

use crate::types::{ImportJob, UpsertOutcome};
use async_trait::async_trait;
use catalog_common::types::{Product, ProductRecord};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

pub use memory::{InMemoryJobRepository, InMemoryProductStore};
#[cfg(feature = "database")]
pub use postgres::{PgJobRepository, PgProductStore};

#[derive(Error, Debug)]
pub enum StorageError {
    /// Connectivity or contention problem that may clear up on its own
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage rejected the operation: {0}")]
    Rejected(String),

    #[error("Stored data is corrupt: {0}")]
    Corrupt(String),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

/// Upsert-capable product catalog keyed by normalized SKU.
///
/// Callers always pass canonical (trimmed, lowercased) SKUs. Implementations
/// must make each per-key upsert atomic with respect to concurrent writers.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn upsert(&self, record: &ProductRecord) -> Result<UpsertOutcome, StorageError>;

    /// Upsert every record or none of them. SKUs within one call are unique.
    /// Outcomes are returned in input order.
    async fn upsert_batch(
        &self,
        records: &[ProductRecord],
    ) -> Result<Vec<UpsertOutcome>, StorageError>;

    async fn exists(&self, sku: &str) -> Result<bool, StorageError>;

    async fn get(&self, sku: &str) -> Result<Option<Product>, StorageError>;

    async fn count(&self) -> Result<u64, StorageError>;
}

/// Persistence for import jobs.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert(&self, job: &ImportJob) -> Result<(), StorageError>;

    /// Atomically move a `pending` job to `parsing` and return it as stored.
    ///
    /// Returns `None` when the job does not exist or is no longer pending, in
    /// which case nothing is modified.
    async fn claim(&self, id: Uuid) -> Result<Option<ImportJob>, StorageError>;

    /// Overwrite the stored job with `job`.
    async fn save(&self, job: &ImportJob) -> Result<(), StorageError>;

    async fn get(&self, id: Uuid) -> Result<Option<ImportJob>, StorageError>;

    /// Most recently created jobs first.
    async fn list(&self, limit: usize) -> Result<Vec<ImportJob>, StorageError>;
}
