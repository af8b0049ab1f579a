//! List imports query
//!
//! Most recent import jobs first.

use catalog_import::{ImportError, ImportService, JobSnapshot};
use mediator::Request;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 200;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListImportsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum ListImportsError {
    #[error("limit must be between 1 and 200")]
    InvalidLimit,

    #[error(transparent)]
    Import(#[from] ImportError),
}

impl Request<Result<Vec<JobSnapshot>, ListImportsError>> for ListImportsQuery {}

impl ListImportsQuery {
    pub fn validate(&self) -> Result<(), ListImportsError> {
        match self.limit {
            Some(limit) if limit == 0 || limit > MAX_LIMIT => Err(ListImportsError::InvalidLimit),
            _ => Ok(()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }
}

pub async fn handle(
    service: &ImportService,
    query: ListImportsQuery,
) -> Result<Vec<JobSnapshot>, ListImportsError> {
    query.validate()?;
    Ok(service.list_jobs(query.limit()).await?)
}
