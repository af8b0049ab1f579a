//! Get import query
//!
//! Current snapshot of one import job.

use catalog_import::{ImportError, ImportService, JobSnapshot};
use mediator::Request;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetImportQuery {
    pub id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GetImportError {
    #[error("Invalid import job id '{0}'")]
    InvalidId(String),

    #[error(transparent)]
    Import(#[from] ImportError),
}

impl Request<Result<JobSnapshot, GetImportError>> for GetImportQuery {}

impl GetImportQuery {
    pub fn job_id(&self) -> Result<Uuid, GetImportError> {
        Uuid::parse_str(self.id.trim()).map_err(|_| GetImportError::InvalidId(self.id.clone()))
    }
}

pub async fn handle(
    service: &ImportService,
    query: GetImportQuery,
) -> Result<JobSnapshot, GetImportError> {
    let id = query.job_id()?;
    Ok(service.get_status(id).await?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_parsing() {
        let id = Uuid::new_v4();
        let query = GetImportQuery { id: id.to_string() };
        assert_eq!(query.job_id().unwrap(), id);

        let query = GetImportQuery { id: "not-a-uuid".into() };
        assert!(matches!(query.job_id(), Err(GetImportError::InvalidId(_))));
    }
}
