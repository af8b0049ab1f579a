//! Import job executor
//!
//! Runs one claimed job over a spooled CSV file in two streaming passes:
//!
//! 1. **Counting** (`parsing`): reads only the SKU column, checks the header
//!    and the row limit, records the total and builds the last-occurrence
//!    index used for deduplication.
//! 2. **Import** (`validating` -> `importing`): normalizes every row, counts
//!    its outcome and upserts the surviving records in batches. The job moves
//!    to `importing` when the first batch is written.
//!
//! Neither pass holds more than one row plus one pending batch in memory.

use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::parser;
use crate::progress::ProgressHub;
use crate::resolver::{Resolution, Resolver, SkuIndex};
use crate::storage::{JobRepository, ProductStore, StorageError};
use crate::tracker::JobTracker;
use crate::types::{ImportJob, ImportStatus, RowOutcome};
use crate::validator::{self, RowRejection};
use crate::webhooks::{EventType, NotificationSink};
use catalog_common::types::ProductRecord;
use chrono::Utc;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

pub struct ImportPipeline {
    products: Arc<dyn ProductStore>,
    jobs: Arc<dyn JobRepository>,
    hub: ProgressHub,
    notifier: Arc<dyn NotificationSink>,
    config: ImportConfig,
}

impl ImportPipeline {
    pub fn new(
        products: Arc<dyn ProductStore>,
        jobs: Arc<dyn JobRepository>,
        hub: ProgressHub,
        notifier: Arc<dyn NotificationSink>,
        config: ImportConfig,
    ) -> Self {
        Self {
            products,
            jobs,
            hub,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Claim a pending job and run it to a terminal state.
    ///
    /// Problems with the file or its storage end the job as `failed` and are
    /// reported through the returned job, not as an `Err`. An `Err` means the
    /// job was not claimed here, or could be neither claimed nor read.
    #[instrument(skip(self, path), fields(job_id = %job_id))]
    pub async fn run(&self, job_id: Uuid, path: &Path) -> Result<ImportJob> {
        let jobs = &self.jobs;

        // Single attempt: a claim whose reply was lost may still have committed.
        let job = match jobs.claim(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                return match self.config.retry.run("get_job", || jobs.get(job_id)).await? {
                    Some(_) => Err(ImportError::AlreadyClaimed(job_id)),
                    None => Err(ImportError::NotFound(job_id)),
                };
            },
            Err(e) => return self.fail_unconfirmed_claim(job_id, e).await,
        };
        info!(filename = %job.filename, "Import job started");

        let mut tracker = self.tracker(job).await;
        match self.execute(&mut tracker, path).await {
            Ok(()) => self.notify_imported(tracker.job()).await,
            Err(e) => tracker.fail(e.to_string()).await,
        }

        Ok(tracker.job().clone())
    }

    async fn tracker(&self, job: ImportJob) -> JobTracker {
        let publisher = self.hub.register(job.snapshot()).await;
        JobTracker::new(
            job,
            self.jobs.clone(),
            publisher,
            self.config.retry,
            self.config.progress_interval_rows,
        )
    }

    /// End a job whose claim failed without an answer.
    ///
    /// Jobs are only ever handed to the executor spawned for them, so a job
    /// left in `pending` or `parsing` here has no other owner and is failed
    /// rather than left hanging.
    async fn fail_unconfirmed_claim(&self, job_id: Uuid, cause: StorageError) -> Result<ImportJob> {
        warn!(error = %cause, "Claiming import job failed");

        let jobs = &self.jobs;
        let mut job = match self.config.retry.run("get_job", || jobs.get(job_id)).await {
            Ok(Some(job)) if job.status.is_terminal() => {
                return Err(ImportError::AlreadyClaimed(job_id))
            },
            Ok(Some(job)) => job,
            Ok(None) => return Err(ImportError::NotFound(job_id)),
            // Nothing readable; the live snapshot is all readers have.
            Err(_) => match self.hub.snapshot(job_id).await {
                Some(snapshot) => snapshot.job,
                None => return Err(cause.into()),
            },
        };

        if job.status == ImportStatus::Pending {
            let now = Utc::now();
            job.status = ImportStatus::Parsing;
            job.started_at = Some(now);
            job.updated_at = now;
        }

        let mut tracker = self.tracker(job).await;
        tracker
            .fail(format!("Import job could not be claimed: {}", cause))
            .await;
        Ok(tracker.job().clone())
    }

    async fn execute(&self, tracker: &mut JobTracker, path: &Path) -> Result<()> {
        let (index, total) = self.count_rows(path).await?;
        tracker.set_total_rows(total).await?;
        debug!(total_rows = total, distinct_skus = index.distinct(), "Counting pass finished");

        tracker.transition(ImportStatus::Validating).await?;

        let mut resolver = Resolver::new(index, self.config.batch_size);
        let mut reader = parser::open(path).await?;

        while let Some(row) = reader.next_row().await? {
            if row.row_number > total {
                return Err(ImportError::FileChanged);
            }

            match validator::normalize(&row) {
                Err(RowRejection::MissingSku) => tracker.record(RowOutcome::Failed),
                Err(RowRejection::Rejected(reason)) => {
                    debug!(row = row.row_number, %reason, "Row skipped");
                    tracker.record(RowOutcome::Skipped);
                },
                Ok(record) => {
                    let sku = record.sku.clone();
                    match resolver.resolve(row.row_number, record)? {
                        Resolution::Duplicate => tracker.record(RowOutcome::Duplicate),
                        Resolution::Deferred => {},
                        Resolution::Probe => {
                            let outcome = self.classify_existing(&sku).await?;
                            tracker.record(outcome);
                        },
                    }
                },
            }

            if resolver.batch_ready() {
                self.flush(tracker, &mut resolver).await?;
            }
            tracker.checkpoint().await?;
        }

        // Always runs so that an all-invalid file still passes through `importing`.
        self.flush(tracker, &mut resolver).await?;

        let job = tracker.job();
        if job.processed_rows != job.total_rows || job.accounted_rows() != job.processed_rows {
            return Err(ImportError::FileChanged);
        }

        tracker.complete().await
    }

    /// First pass: SKU column only.
    async fn count_rows(&self, path: &Path) -> Result<(SkuIndex, u64)> {
        let mut reader = parser::open(path).await?;
        let mut index = SkuIndex::new();
        let limit = self.config.max_rows;

        while let Some(sku) = reader.next_sku().await? {
            let row_number = reader.rows_read();
            if row_number > limit {
                return Err(ImportError::TooManyRows { limit });
            }
            index.observe(&sku, row_number);
        }

        match reader.rows_read() {
            0 => Err(ImportError::NoDataRows),
            total => Ok((index, total)),
        }
    }

    /// Count the first of several occurrences of a SKU by whether it existed
    /// before this job wrote it.
    async fn classify_existing(&self, sku: &str) -> Result<RowOutcome> {
        let products = &self.products;
        let existed = self
            .config
            .retry
            .run("product_exists", || products.exists(sku))
            .await?;
        Ok(if existed {
            RowOutcome::Duplicate
        } else {
            RowOutcome::Created
        })
    }

    async fn flush(&self, tracker: &mut JobTracker, resolver: &mut Resolver) -> Result<()> {
        if tracker.status() == ImportStatus::Validating {
            tracker.transition(ImportStatus::Importing).await?;
        }

        let batch = resolver.take_batch();
        if batch.is_empty() {
            return Ok(());
        }

        let (records, counts_row): (Vec<ProductRecord>, Vec<bool>) = batch
            .into_iter()
            .map(|pending| (pending.record, pending.counts_row))
            .unzip();

        let products = &self.products;
        let outcomes = self
            .config
            .retry
            .run("upsert_batch", || products.upsert_batch(&records))
            .await?;

        if outcomes.len() != records.len() {
            return Err(StorageError::Corrupt(format!(
                "upsert_batch returned {} outcomes for {} records",
                outcomes.len(),
                records.len()
            ))
            .into());
        }

        for (outcome, counts) in outcomes.into_iter().zip(counts_row) {
            if counts {
                tracker.record(outcome.into());
            }
        }

        debug!(
            job_id = %tracker.id(),
            records = records.len(),
            processed = tracker.job().processed_rows,
            "Batch upserted"
        );
        Ok(())
    }

    /// Best effort: retried, logged, never fails the job.
    async fn notify_imported(&self, job: &ImportJob) {
        let payload = json!({
            "job_id": job.id,
            "total_imported": job.successful_rows + job.duplicate_rows,
            "total_created": job.successful_rows,
            "total_duplicates": job.duplicate_rows,
            "total_failed": job.failed_rows,
            "total_skipped": job.skipped_rows,
        });

        let retry = self.config.retry;
        let max_attempts = retry.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self
                .notifier
                .notify(EventType::ProductImported, payload.clone())
                .await
            {
                Ok(()) => return,
                Err(e) if attempt < max_attempts => {
                    warn!(job_id = %job.id, attempt, error = %e, "Import notification failed, retrying");
                    tokio::time::sleep(retry.delay_for(attempt)).await;
                },
                Err(e) => {
                    warn!(job_id = %job.id, attempt, error = %e, "Giving up on import notification");
                },
            }
        }
    }
}
