//! Import API routes
//!
//! # Route Structure
//!
//! - `POST /api/v1/imports` - Upload a CSV file (multipart field `file`)
//! - `GET /api/v1/imports` - List recent import jobs
//! - `GET /api/v1/imports/:id` - Job snapshot, or an SSE stream when the
//!   client accepts `text/event-stream`
//! - `GET /api/v1/imports/:id/events` - SSE stream of job snapshots

use crate::api::response::ApiResponse;
use crate::error::AppError;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use catalog_import::ImportService;
use futures::TryStreamExt;
use serde_json::json;
use tokio_util::io::StreamReader;

use super::{
    commands::{submit, SubmitImportCommand, SubmitImportError},
    queries::{
        get_import, list_imports, stream_import, GetImportError, GetImportQuery,
        ListImportsError, ListImportsQuery, StreamImportQuery,
    },
};

const UPLOAD_FIELD: &str = "file";

// ============================================================================
// Router Configuration
// ============================================================================

pub fn imports_routes(upload_body_limit: usize) -> Router<ImportService> {
    Router::new()
        .route(
            "/",
            post(submit_import).layer(DefaultBodyLimit::max(upload_body_limit)),
        )
        .route("/", get(list_imports))
        .route("/:id", get(get_import))
        .route("/:id/events", get(stream_import))
}

// ============================================================================
// Command Handlers (Write Operations)
// ============================================================================

/// Upload a CSV file and start importing it
///
/// # Response
///
/// - `202 Accepted` - Job created, import running in the background
/// - `400 Bad Request` - Missing file field, non-CSV filename or empty file
/// - `413 Payload Too Large` - File exceeds the upload limit
#[tracing::instrument(skip(service, multipart))]
async fn submit_import(
    State(service): State<ImportService>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let command = SubmitImportCommand::from_upload(field.file_name());
        let body = StreamReader::new(Box::pin(field.map_err(std::io::Error::other)));
        let job = submit::handle(&service, command, body).await?;

        tracing::info!(
            job_id = %job.id,
            filename = %job.filename,
            "Import submitted via API"
        );

        return Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(job.snapshot())))
            .into_response());
    }

    Err(AppError::BadRequest(format!(
        "Multipart field '{}' is required",
        UPLOAD_FIELD
    )))
}

// ============================================================================
// Query Handlers (Read Operations)
// ============================================================================

/// List recent import jobs
///
/// GET /imports?limit=50
#[tracing::instrument(skip(service))]
async fn list_imports(
    State(service): State<ImportService>,
    Query(query): Query<ListImportsQuery>,
) -> Result<Response, AppError> {
    let limit = query.limit();
    let jobs = list_imports::handle(&service, query).await?;
    let count = jobs.len();

    Ok(ApiResponse::success_with_meta(jobs, json!({ "limit": limit, "count": count }))
        .into_response())
}

/// Get one import job
///
/// GET /imports/:id
#[tracing::instrument(skip(service, headers))]
async fn get_import(
    State(service): State<ImportService>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if wants_event_stream(&headers) {
        return stream_import(State(service), Path(id)).await;
    }

    let snapshot = get_import::handle(&service, GetImportQuery { id }).await?;
    Ok(ApiResponse::success(snapshot).into_response())
}

/// Follow an import job as Server-Sent Events
///
/// GET /imports/:id/events
#[tracing::instrument(skip(service))]
async fn stream_import(
    State(service): State<ImportService>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let stream = stream_import::handle(&service, StreamImportQuery { id }).await?;
    Ok(stream_import::into_sse_response(stream))
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"))
}

// ============================================================================
// Error mapping
// ============================================================================

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::BadRequest(err.body_text())
    }
}

impl From<SubmitImportError> for AppError {
    fn from(err: SubmitImportError) -> Self {
        match err {
            SubmitImportError::Import(e) => e.into(),
            e => AppError::Validation(e.to_string()),
        }
    }
}

impl From<GetImportError> for AppError {
    fn from(err: GetImportError) -> Self {
        match err {
            GetImportError::Import(e) => e.into(),
            e @ GetImportError::InvalidId(_) => AppError::BadRequest(e.to_string()),
        }
    }
}

impl From<ListImportsError> for AppError {
    fn from(err: ListImportsError) -> Self {
        match err {
            ListImportsError::Import(e) => e.into(),
            e @ ListImportsError::InvalidLimit => AppError::Validation(e.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_wants_event_stream() {
        let mut headers = HeaderMap::new();
        assert!(!wants_event_stream(&headers));

        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        assert!(!wants_event_stream(&headers));

        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream, */*;q=0.1"),
        );
        assert!(wants_event_stream(&headers));
    }

    #[test]
    fn test_routes_build() {
        let _router = imports_routes(1024);
    }
}
