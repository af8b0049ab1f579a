//! Job state machine and counters
//!
//! A [`JobTracker`] is owned by the single executor of a job. It is the only
//! thing that mutates the job record: every change is persisted through the
//! [`JobRepository`] first and then published to live readers, so neither view
//! ever runs ahead of the other.

use crate::error::{ImportError, Result};
use crate::progress::ProgressPublisher;
use crate::retry::RetryPolicy;
use crate::storage::JobRepository;
use crate::types::{ImportJob, ImportStatus, RowOutcome};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

pub struct JobTracker {
    job: ImportJob,
    repository: Arc<dyn JobRepository>,
    publisher: ProgressPublisher,
    retry: RetryPolicy,
    publish_every: u64,
    last_published: u64,
}

impl JobTracker {
    pub fn new(
        job: ImportJob,
        repository: Arc<dyn JobRepository>,
        publisher: ProgressPublisher,
        retry: RetryPolicy,
        publish_every: u64,
    ) -> Self {
        Self {
            last_published: job.processed_rows,
            job,
            repository,
            publisher,
            retry,
            publish_every: publish_every.max(1),
        }
    }

    pub fn job(&self) -> &ImportJob {
        &self.job
    }

    pub fn id(&self) -> Uuid {
        self.job.id
    }

    pub fn status(&self) -> ImportStatus {
        self.job.status
    }

    async fn commit(&mut self, next: ImportJob) -> Result<()> {
        let repository = &self.repository;
        self.retry
            .run("save_job", || repository.save(&next))
            .await?;

        self.last_published = next.processed_rows;
        self.publisher.publish(next.snapshot());
        self.job = next;
        Ok(())
    }

    pub async fn transition(&mut self, to: ImportStatus) -> Result<()> {
        let from = self.job.status;
        if !from.can_transition_to(to) {
            return Err(ImportError::InvalidTransition { from, to });
        }

        let mut next = self.job.clone();
        let now = Utc::now();
        next.status = to;
        next.updated_at = now;
        if to.is_terminal() {
            next.finished_at = Some(now);
        }

        self.commit(next).await?;
        info!(job_id = %self.job.id, %from, %to, "Import job status changed");
        Ok(())
    }

    /// Record the row count from the counting pass. Never lowers the total.
    pub async fn set_total_rows(&mut self, total: u64) -> Result<()> {
        let mut next = self.job.clone();
        next.total_rows = next.total_rows.max(total);
        next.updated_at = Utc::now();
        self.commit(next).await
    }

    pub fn record(&mut self, outcome: RowOutcome) {
        let job = &mut self.job;
        job.processed_rows += 1;
        match outcome {
            RowOutcome::Created => job.successful_rows += 1,
            RowOutcome::Duplicate => job.duplicate_rows += 1,
            RowOutcome::Failed => job.failed_rows += 1,
            RowOutcome::Skipped => job.skipped_rows += 1,
        }
    }

    /// Persist and publish if enough rows went by since the last publication.
    pub async fn checkpoint(&mut self) -> Result<()> {
        if self.job.processed_rows - self.last_published < self.publish_every {
            return Ok(());
        }

        let mut next = self.job.clone();
        next.updated_at = Utc::now();
        self.commit(next).await?;
        debug!(
            job_id = %self.job.id,
            processed = self.job.processed_rows,
            total = self.job.total_rows,
            "Import progress"
        );
        Ok(())
    }

    pub async fn complete(&mut self) -> Result<()> {
        self.transition(ImportStatus::Completed).await?;
        info!(
            job_id = %self.job.id,
            processed = self.job.processed_rows,
            successful = self.job.successful_rows,
            duplicates = self.job.duplicate_rows,
            failed = self.job.failed_rows,
            skipped = self.job.skipped_rows,
            "Import job completed"
        );
        Ok(())
    }

    /// Move the job to `failed`.
    ///
    /// Readers always see the failure, even when it cannot be persisted.
    pub async fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        if self.job.status.is_terminal() {
            error!(job_id = %self.job.id, status = %self.job.status, error = %message, "Error after job finished");
            return;
        }

        let now = Utc::now();
        let from = self.job.status;
        self.job.status = ImportStatus::Failed;
        self.job.error_message = Some(message.clone());
        self.job.updated_at = now;
        self.job.finished_at = Some(now);

        let repository = &self.repository;
        let job = &self.job;
        if let Err(e) = self.retry.run("save_job", || repository.save(job)).await {
            error!(job_id = %job.id, error = %e, "Failed to persist job failure");
        }

        self.last_published = self.job.processed_rows;
        self.publisher.publish(self.job.snapshot());
        error!(job_id = %self.job.id, %from, error = %message, "Import job failed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::progress::ProgressHub;
    use crate::storage::InMemoryJobRepository;
    use futures::StreamExt;

    async fn tracker(publish_every: u64) -> (JobTracker, Arc<InMemoryJobRepository>, ProgressHub) {
        let repository = Arc::new(InMemoryJobRepository::new());
        let hub = ProgressHub::new();
        let job = ImportJob::new("products.csv");
        repository.insert(&job).await.unwrap();
        let job = repository.claim(job.id).await.unwrap().unwrap();
        let publisher = hub.register(job.snapshot()).await;
        let tracker = JobTracker::new(
            job,
            repository.clone(),
            publisher,
            RetryPolicy::no_retry(),
            publish_every,
        );
        (tracker, repository, hub)
    }

    #[tokio::test]
    async fn test_full_lifecycle_is_persisted() {
        let (mut tracker, repository, _hub) = tracker(100).await;

        tracker.set_total_rows(2).await.unwrap();
        tracker.transition(ImportStatus::Validating).await.unwrap();
        tracker.transition(ImportStatus::Importing).await.unwrap();
        tracker.record(RowOutcome::Created);
        tracker.record(RowOutcome::Failed);
        tracker.complete().await.unwrap();

        let stored = repository.get(tracker.id()).await.unwrap().unwrap();
        assert_eq!(stored.status, ImportStatus::Completed);
        assert_eq!(stored.processed_rows, 2);
        assert_eq!(stored.accounted_rows(), 2);
        assert!(stored.finished_at.is_some());
        assert_eq!(stored.progress_percentage(), 100.0);
    }

    #[tokio::test]
    async fn test_backward_transition_is_rejected() {
        let (mut tracker, _repository, _hub) = tracker(100).await;
        tracker.transition(ImportStatus::Validating).await.unwrap();

        let err = tracker.transition(ImportStatus::Parsing).await.unwrap_err();
        assert!(matches!(
            err,
            ImportError::InvalidTransition {
                from: ImportStatus::Validating,
                to: ImportStatus::Parsing
            }
        ));
        assert_eq!(tracker.status(), ImportStatus::Validating);
    }

    #[tokio::test]
    async fn test_checkpoint_is_throttled() {
        let (mut tracker, repository, hub) = tracker(3).await;
        tracker.set_total_rows(10).await.unwrap();
        tracker.transition(ImportStatus::Validating).await.unwrap();

        tracker.record(RowOutcome::Created);
        tracker.record(RowOutcome::Created);
        tracker.checkpoint().await.unwrap();
        assert_eq!(hub.snapshot(tracker.id()).await.unwrap().job.processed_rows, 0);

        tracker.record(RowOutcome::Duplicate);
        tracker.checkpoint().await.unwrap();
        let live = hub.snapshot(tracker.id()).await.unwrap();
        assert_eq!(live.job.processed_rows, 3);
        assert_eq!(live.job.accounted_rows(), 3);

        let stored = repository.get(tracker.id()).await.unwrap().unwrap();
        assert_eq!(stored.processed_rows, 3);
    }

    #[tokio::test]
    async fn test_fail_sets_message_and_ends_stream() {
        let (mut tracker, repository, hub) = tracker(100).await;
        let stream = hub.subscribe(tracker.id()).await.unwrap();

        tracker.fail("Missing required column: sku").await;

        let snapshots: Vec<_> = stream.collect().await;
        let last = snapshots.last().unwrap();
        assert_eq!(last.status(), ImportStatus::Failed);
        assert_eq!(last.job.error_message.as_deref(), Some("Missing required column: sku"));

        let stored = repository.get(tracker.id()).await.unwrap().unwrap();
        assert_eq!(stored.status, ImportStatus::Failed);
    }

    #[tokio::test]
    async fn test_fail_after_completion_is_ignored() {
        let (mut tracker, _repository, _hub) = tracker(100).await;
        tracker.transition(ImportStatus::Validating).await.unwrap();
        tracker.transition(ImportStatus::Importing).await.unwrap();
        tracker.complete().await.unwrap();

        tracker.fail("late error").await;
        assert_eq!(tracker.status(), ImportStatus::Completed);
        assert!(tracker.job().error_message.is_none());
    }
}
