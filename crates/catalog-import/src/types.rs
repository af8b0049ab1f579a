//! Core types for import jobs

use catalog_common::CatalogError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Import job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Pending,
    Parsing,
    Validating,
    Importing,
    Completed,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Pending => "pending",
            ImportStatus::Parsing => "parsing",
            ImportStatus::Validating => "validating",
            ImportStatus::Importing => "importing",
            ImportStatus::Completed => "completed",
            ImportStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportStatus::Completed | ImportStatus::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// Progress is strictly forward. `failed` is reachable from every
    /// non-terminal state once a job has been claimed.
    pub fn can_transition_to(&self, next: ImportStatus) -> bool {
        use ImportStatus::*;
        matches!(
            (self, next),
            (Pending, Parsing)
                | (Parsing, Validating)
                | (Validating, Importing)
                | (Importing, Completed)
                | (Parsing | Validating | Importing, Failed)
        )
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ImportStatus::Pending),
            "parsing" => Ok(ImportStatus::Parsing),
            "validating" => Ok(ImportStatus::Validating),
            "importing" => Ok(ImportStatus::Importing),
            "completed" => Ok(ImportStatus::Completed),
            "failed" => Ok(ImportStatus::Failed),
            other => Err(CatalogError::invalid("import status", other)),
        }
    }
}

/// Import job (maps to the import_jobs table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: Uuid,
    pub filename: String,
    pub status: ImportStatus,
    pub total_rows: u64,
    pub processed_rows: u64,
    pub successful_rows: u64,
    pub duplicate_rows: u64,
    pub failed_rows: u64,
    pub skipped_rows: u64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    pub fn new(filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            status: ImportStatus::Pending,
            total_rows: 0,
            processed_rows: 0,
            successful_rows: 0,
            duplicate_rows: 0,
            failed_rows: 0,
            skipped_rows: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_terminal()
    }

    /// Share of rows processed, rounded down to one decimal.
    ///
    /// Only a completed job reports 100; anything still running or failed is
    /// held at 99.9 at most so the value never overstates progress.
    pub fn progress_percentage(&self) -> f64 {
        if self.status == ImportStatus::Completed {
            return 100.0;
        }
        if self.total_rows == 0 {
            return 0.0;
        }
        let per_mille = self.processed_rows.min(self.total_rows) * 1000 / self.total_rows;
        (per_mille.min(999) as f64) / 10.0
    }

    /// Sum of all outcome buckets.
    pub fn accounted_rows(&self) -> u64 {
        self.successful_rows + self.duplicate_rows + self.failed_rows + self.skipped_rows
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            progress_percentage: self.progress_percentage(),
            is_complete: self.is_complete(),
            job: self.clone(),
        }
    }
}

/// Immutable point-in-time view of a job, including derived fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    #[serde(flatten)]
    pub job: ImportJob,
    pub progress_percentage: f64,
    pub is_complete: bool,
}

impl JobSnapshot {
    pub fn id(&self) -> Uuid {
        self.job.id
    }

    pub fn status(&self) -> ImportStatus {
        self.job.status
    }
}

impl From<ImportJob> for JobSnapshot {
    fn from(job: ImportJob) -> Self {
        job.snapshot()
    }
}

/// How one physical CSV row was accounted for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    /// First occurrence of a SKU that did not exist before the job
    Created,
    /// Later occurrence within the file, or a SKU that already existed
    Duplicate,
    /// Missing SKU
    Failed,
    /// Rejected by a rule other than the SKU check
    Skipped,
}

/// Result of a single keyed write to the product store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

impl From<UpsertOutcome> for RowOutcome {
    fn from(outcome: UpsertOutcome) -> Self {
        match outcome {
            UpsertOutcome::Created => RowOutcome::Created,
            UpsertOutcome::Updated => RowOutcome::Duplicate,
        }
    }
}
