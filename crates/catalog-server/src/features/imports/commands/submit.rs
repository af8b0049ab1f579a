//! Submit import command
//!
//! Starts an import job from an uploaded CSV file. The file body is streamed
//! straight to the import service; the command itself only carries the
//! metadata that can be validated up front.

use catalog_import::{ImportError, ImportJob, ImportService};
use mediator::Request;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::AsyncRead;

const MAX_FILENAME_LENGTH: usize = 255;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitImportCommand {
    /// Client-supplied filename of the upload
    pub filename: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitImportError {
    #[error("Filename is required and cannot be empty")]
    FilenameRequired,

    #[error("Filename must not exceed 255 characters")]
    FilenameLength,

    #[error("Only .csv files are accepted")]
    NotCsv,

    #[error(transparent)]
    Import(#[from] ImportError),
}

impl Request<Result<ImportJob, SubmitImportError>> for SubmitImportCommand {}

impl SubmitImportCommand {
    /// Build the command from a client filename, dropping any directory part.
    pub fn from_upload(filename: Option<&str>) -> Self {
        let filename = filename
            .map(|name| {
                Path::new(name.trim())
                    .file_name()
                    .map(|base| base.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
            .unwrap_or_default();
        Self { filename }
    }

    #[tracing::instrument(skip(self), fields(filename = %self.filename))]
    pub fn validate(&self) -> Result<(), SubmitImportError> {
        let filename = self.filename.trim();
        if filename.is_empty() {
            return Err(SubmitImportError::FilenameRequired);
        }
        if filename.chars().count() > MAX_FILENAME_LENGTH {
            return Err(SubmitImportError::FilenameLength);
        }
        if !filename.to_lowercase().ends_with(".csv") {
            return Err(SubmitImportError::NotCsv);
        }
        Ok(())
    }
}

pub async fn handle<R>(
    service: &ImportService,
    command: SubmitImportCommand,
    source: R,
) -> Result<ImportJob, SubmitImportError>
where
    R: AsyncRead + Unpin + Send,
{
    command.validate()?;
    let job = service.submit(source, &command.filename).await?;
    Ok(job)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_extension_is_case_insensitive() {
        assert!(SubmitImportCommand::from_upload(Some("Products.CSV")).validate().is_ok());
        assert!(matches!(
            SubmitImportCommand::from_upload(Some("products.xlsx")).validate(),
            Err(SubmitImportError::NotCsv)
        ));
    }

    #[test]
    fn test_directory_part_is_dropped() {
        let command = SubmitImportCommand::from_upload(Some("../../etc/products.csv"));
        assert_eq!(command.filename, "products.csv");
    }

    #[test]
    fn test_missing_filename() {
        assert!(matches!(
            SubmitImportCommand::from_upload(None).validate(),
            Err(SubmitImportError::FilenameRequired)
        ));
    }

    #[test]
    fn test_filename_length() {
        let name = format!("{}.csv", "a".repeat(300));
        assert!(matches!(
            SubmitImportCommand::from_upload(Some(&name)).validate(),
            Err(SubmitImportError::FilenameLength)
        ));
    }
}
