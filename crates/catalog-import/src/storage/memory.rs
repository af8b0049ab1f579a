//! In-memory storage backends
//!
//! Used by the command-line dry run, by `STORAGE_BACKEND=memory` servers, and by
//! tests. Every operation takes the lock once, so batch upserts are atomic.

use super::{JobRepository, ProductStore, StorageError};
use crate::types::{ImportJob, ImportStatus, UpsertOutcome};
use async_trait::async_trait;
use catalog_common::types::{Product, ProductRecord};
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct InMemoryProductStore {
    products: RwLock<HashMap<String, Product>>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn products(&self) -> Vec<Product> {
        let mut products: Vec<Product> = self.products.read().await.values().cloned().collect();
        products.sort_by(|a, b| a.sku.cmp(&b.sku));
        products
    }

    fn apply(products: &mut HashMap<String, Product>, record: &ProductRecord) -> UpsertOutcome {
        match products.get_mut(&record.sku) {
            Some(existing) => {
                existing.apply(record);
                UpsertOutcome::Updated
            },
            None => {
                products.insert(record.sku.clone(), Product::from_record(record));
                UpsertOutcome::Created
            },
        }
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn upsert(&self, record: &ProductRecord) -> Result<UpsertOutcome, StorageError> {
        let mut products = self.products.write().await;
        Ok(Self::apply(&mut products, record))
    }

    async fn upsert_batch(
        &self,
        records: &[ProductRecord],
    ) -> Result<Vec<UpsertOutcome>, StorageError> {
        let mut products = self.products.write().await;
        Ok(records
            .iter()
            .map(|record| Self::apply(&mut products, record))
            .collect())
    }

    async fn exists(&self, sku: &str) -> Result<bool, StorageError> {
        Ok(self.products.read().await.contains_key(sku))
    }

    async fn get(&self, sku: &str) -> Result<Option<Product>, StorageError> {
        Ok(self.products.read().await.get(sku).cloned())
    }

    async fn count(&self) -> Result<u64, StorageError> {
        Ok(self.products.read().await.len() as u64)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<Uuid, ImportJob>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn insert(&self, job: &ImportJob) -> Result<(), StorageError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StorageError::Rejected(format!(
                "import job {} already exists",
                job.id
            )));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn claim(&self, id: Uuid) -> Result<Option<ImportJob>, StorageError> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) if job.status == ImportStatus::Pending => {
                let now = Utc::now();
                job.status = ImportStatus::Parsing;
                job.started_at = Some(now);
                job.updated_at = now;
                Ok(Some(job.clone()))
            },
            _ => Ok(None),
        }
    }

    async fn save(&self, job: &ImportJob) -> Result<(), StorageError> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ImportJob>, StorageError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list(&self, limit: usize) -> Result<Vec<ImportJob>, StorageError> {
        let mut jobs: Vec<ImportJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_upsert_reports_created_then_updated() {
        let store = InMemoryProductStore::new();
        let record = ProductRecord::new("sku-001", "Widget");

        assert_eq!(store.upsert(&record).await.unwrap(), UpsertOutcome::Created);
        assert_eq!(store.upsert(&record).await.unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_batch_overwrites_existing_fields() {
        let store = InMemoryProductStore::new();
        store
            .upsert(&ProductRecord::new("a", "Old").with_price(Some(Decimal::new(500, 2))))
            .await
            .unwrap();

        let outcomes = store
            .upsert_batch(&[ProductRecord::new("a", "New"), ProductRecord::new("b", "B")])
            .await
            .unwrap();

        assert_eq!(outcomes, vec![UpsertOutcome::Updated, UpsertOutcome::Created]);
        let a = store.get("a").await.unwrap().unwrap();
        assert_eq!(a.name, "New");
        assert_eq!(a.price, None);
        assert!(store.exists("b").await.unwrap());
        assert!(!store.exists("c").await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let repo = Arc::new(InMemoryJobRepository::new());
        let job = ImportJob::new("products.csv");
        repo.insert(&job).await.unwrap();
        let id = job.id;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.claim(id).await.unwrap().is_some() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        let stored = repo.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, ImportStatus::Parsing);
        assert!(stored.started_at.is_some());
    }

    #[tokio::test]
    async fn test_claim_unknown_job() {
        let repo = InMemoryJobRepository::new();
        assert!(repo.claim(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let repo = InMemoryJobRepository::new();
        let mut older = ImportJob::new("old.csv");
        older.created_at = Utc::now() - chrono::Duration::minutes(5);
        let newer = ImportJob::new("new.csv");
        repo.insert(&older).await.unwrap();
        repo.insert(&newer).await.unwrap();

        let jobs = repo.list(10).await.unwrap();
        assert_eq!(jobs[0].filename, "new.csv");
        assert_eq!(jobs[1].filename, "old.csv");
        assert_eq!(repo.list(1).await.unwrap().len(), 1);
    }
}
