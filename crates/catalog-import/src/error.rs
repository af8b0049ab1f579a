//! Error types for the import pipeline

use crate::storage::StorageError;
use crate::types::ImportStatus;
use catalog_common::CatalogError;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, ImportError>;

#[derive(Error, Debug)]
pub enum ImportError {
    /// The submitted upload is unusable before a job exists for it.
    #[error("Invalid file: {0}")]
    InvalidFile(String),

    #[error("Import job not found: {0}")]
    NotFound(Uuid),

    #[error("Import job {0} is already claimed by another executor")]
    AlreadyClaimed(Uuid),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: ImportStatus,
        to: ImportStatus,
    },

    #[error("Missing required column: {0}")]
    MissingColumn(&'static str),

    #[error("CSV file contains no data rows")]
    NoDataRows,

    #[error("CSV file has more than the limit of {limit} data rows")]
    TooManyRows { limit: u64 },

    #[error("Upload exceeds the limit of {limit} bytes")]
    FileTooLarge { limit: u64 },

    #[error("CSV file changed while it was being imported")]
    FileChanged,

    #[error("Unreadable CSV: {0}")]
    Csv(#[from] csv_async::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Common(#[from] CatalogError),
}

impl ImportError {
    /// Structural problems with the uploaded file, as opposed to collaborator
    /// or programming errors.
    pub fn is_file_error(&self) -> bool {
        matches!(
            self,
            ImportError::InvalidFile(_)
                | ImportError::MissingColumn(_)
                | ImportError::NoDataRows
                | ImportError::TooManyRows { .. }
                | ImportError::FileTooLarge { .. }
                | ImportError::FileChanged
                | ImportError::Csv(_)
        )
    }
}
