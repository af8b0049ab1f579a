//! Stream import query
//!
//! Server-Sent Events feed of an import job. Each snapshot is sent as a
//! `progress` event carrying the job as JSON; the stream closes after the
//! terminal snapshot.

use axum::{
    http::{header, HeaderName, HeaderValue},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use catalog_import::{ImportService, JobSnapshot, ProgressStream};
use futures::StreamExt;
use mediator::Request;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;

use super::get_import::{GetImportError, GetImportQuery};

pub const PROGRESS_EVENT: &str = "progress";
const KEEP_ALIVE_SECS: u64 = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamImportQuery {
    pub id: String,
}

pub type StreamImportError = GetImportError;

impl Request<Result<ProgressStream, StreamImportError>> for StreamImportQuery {}

pub async fn handle(
    service: &ImportService,
    query: StreamImportQuery,
) -> Result<ProgressStream, StreamImportError> {
    let id = GetImportQuery { id: query.id }.job_id()?;
    Ok(service.subscribe(id).await?)
}

fn progress_event(snapshot: &JobSnapshot) -> Event {
    Event::default()
        .event(PROGRESS_EVENT)
        .json_data(snapshot)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

/// Wrap a snapshot stream as an SSE response that proxies do not buffer.
pub fn into_sse_response(stream: ProgressStream) -> Response {
    let events = stream.map(|snapshot| Ok::<_, Infallible>(progress_event(&snapshot)));

    let sse = Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(KEEP_ALIVE_SECS))
            .text("keep-alive"),
    );

    (
        [
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (
                HeaderName::from_static("x-accel-buffering"),
                HeaderValue::from_static("no"),
            ),
        ],
        sse,
    )
        .into_response()
}
