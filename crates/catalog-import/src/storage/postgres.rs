//! PostgreSQL storage backends
//!
//! Schema lives in `migrations/`. Products are keyed by the unique `sku`
//! column; batch upserts run inside one transaction and use
//! `INSERT ... ON CONFLICT (sku) DO UPDATE` so Postgres serializes concurrent
//! writers per key.

use super::{JobRepository, ProductStore, StorageError};
use crate::types::{ImportJob, ImportStatus, UpsertOutcome};
use async_trait::async_trait;
use catalog_common::types::{Product, ProductRecord};
use sqlx::{postgres::PgRow, PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Rows per INSERT statement, well under the bind parameter limit.
const UPSERT_CHUNK_SIZE: usize = 1000;

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StorageError::Unavailable(err.to_string()),
            sqlx::Error::Database(db) => {
                let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
                // 08xxx connection exceptions, 40001 serialization failure,
                // 40P01 deadlock, 57P01 admin shutdown
                if code.starts_with("08") || code == "40001" || code == "40P01" || code == "57P01"
                {
                    StorageError::Unavailable(err.to_string())
                } else {
                    StorageError::Rejected(err.to_string())
                }
            },
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StorageError::Corrupt(err.to_string())
            },
            _ => StorageError::Rejected(err.to_string()),
        }
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn product_from_row(row: &PgRow) -> Result<Product, StorageError> {
        Ok(Product {
            id: row.try_get("id")?,
            sku: row.try_get("sku")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price: row.try_get("price")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn upsert_chunk(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        records: &[ProductRecord],
    ) -> Result<HashMap<String, bool>, StorageError> {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO products (id, sku, name, description, price, is_active) ",
        );

        query_builder.push_values(records.iter(), |mut b, record| {
            b.push_bind(Uuid::new_v4())
                .push_bind(&record.sku)
                .push_bind(&record.name)
                .push_bind(&record.description)
                .push_bind(record.price)
                .push_bind(record.is_active);
        });

        query_builder.push(
            r#"
            ON CONFLICT (sku) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                price = EXCLUDED.price,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            RETURNING sku, (xmax = 0) AS inserted
            "#,
        );

        let rows = query_builder.build().fetch_all(&mut **tx).await?;

        let mut inserted = HashMap::with_capacity(rows.len());
        for row in rows {
            let sku: String = row.try_get("sku")?;
            let was_inserted: bool = row.try_get("inserted")?;
            inserted.insert(sku, was_inserted);
        }
        Ok(inserted)
    }
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn upsert(&self, record: &ProductRecord) -> Result<UpsertOutcome, StorageError> {
        let mut outcomes = self.upsert_batch(std::slice::from_ref(record)).await?;
        outcomes
            .pop()
            .ok_or_else(|| StorageError::Corrupt(format!("no upsert result for {}", record.sku)))
    }

    async fn upsert_batch(
        &self,
        records: &[ProductRecord],
    ) -> Result<Vec<UpsertOutcome>, StorageError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = HashMap::with_capacity(records.len());
        for chunk in records.chunks(UPSERT_CHUNK_SIZE) {
            inserted.extend(Self::upsert_chunk(&mut tx, chunk).await?);
        }
        tx.commit().await?;

        debug!(count = records.len(), "Upserted product batch");

        records
            .iter()
            .map(|record| match inserted.get(&record.sku) {
                Some(true) => Ok(UpsertOutcome::Created),
                Some(false) => Ok(UpsertOutcome::Updated),
                None => Err(StorageError::Corrupt(format!(
                    "no upsert result for {}",
                    record.sku
                ))),
            })
            .collect()
    }

    async fn exists(&self, sku: &str) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM products WHERE sku = $1) AS found")
            .bind(sku)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("found")?)
    }

    async fn get(&self, sku: &str) -> Result<Option<Product>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT id, sku, name, description, price, is_active, created_at, updated_at
            FROM products
            WHERE sku = $1
            "#,
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::product_from_row).transpose()
    }

    async fn count(&self) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(to_u64(row.try_get("total")?))
    }
}

#[derive(Debug, Clone)]
pub struct PgJobRepository {
    pool: PgPool,
}

const JOB_COLUMNS: &str = "id, filename, status, total_rows, processed_rows, successful_rows, \
     duplicate_rows, failed_rows, skipped_rows, error_message, created_at, updated_at, \
     started_at, finished_at";

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn job_from_row(row: &PgRow) -> Result<ImportJob, StorageError> {
        let status: String = row.try_get("status")?;
        let status: ImportStatus = status
            .parse()
            .map_err(|e: catalog_common::CatalogError| StorageError::Corrupt(e.to_string()))?;

        Ok(ImportJob {
            id: row.try_get("id")?,
            filename: row.try_get("filename")?,
            status,
            total_rows: to_u64(row.try_get("total_rows")?),
            processed_rows: to_u64(row.try_get("processed_rows")?),
            successful_rows: to_u64(row.try_get("successful_rows")?),
            duplicate_rows: to_u64(row.try_get("duplicate_rows")?),
            failed_rows: to_u64(row.try_get("failed_rows")?),
            skipped_rows: to_u64(row.try_get("skipped_rows")?),
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
        })
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn insert(&self, job: &ImportJob) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO import_jobs (
                id, filename, status, total_rows, processed_rows, successful_rows,
                duplicate_rows, failed_rows, skipped_rows, error_message,
                created_at, updated_at, started_at, finished_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(job.id)
        .bind(&job.filename)
        .bind(job.status.as_str())
        .bind(to_i64(job.total_rows))
        .bind(to_i64(job.processed_rows))
        .bind(to_i64(job.successful_rows))
        .bind(to_i64(job.duplicate_rows))
        .bind(to_i64(job.failed_rows))
        .bind(to_i64(job.skipped_rows))
        .bind(&job.error_message)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.started_at)
        .bind(job.finished_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim(&self, id: Uuid) -> Result<Option<ImportJob>, StorageError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE import_jobs
            SET status = 'parsing', started_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::job_from_row).transpose()
    }

    async fn save(&self, job: &ImportJob) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            UPDATE import_jobs
            SET status = $2,
                total_rows = $3,
                processed_rows = $4,
                successful_rows = $5,
                duplicate_rows = $6,
                failed_rows = $7,
                skipped_rows = $8,
                error_message = $9,
                updated_at = $10,
                started_at = $11,
                finished_at = $12
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(to_i64(job.total_rows))
        .bind(to_i64(job.processed_rows))
        .bind(to_i64(job.successful_rows))
        .bind(to_i64(job.duplicate_rows))
        .bind(to_i64(job.failed_rows))
        .bind(to_i64(job.skipped_rows))
        .bind(&job.error_message)
        .bind(job.updated_at)
        .bind(job.started_at)
        .bind(job.finished_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ImportJob>, StorageError> {
        let row = sqlx::query(&format!("SELECT {} FROM import_jobs WHERE id = $1", JOB_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::job_from_row).transpose()
    }

    async fn list(&self, limit: usize) -> Result<Vec<ImportJob>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM import_jobs ORDER BY created_at DESC LIMIT $1",
            JOB_COLUMNS
        ))
        .bind(to_i64(limit as u64))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::job_from_row).collect()
    }
}
