//! Catalog Server Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! HTTP front end for CSV product imports.
//!
//! # Overview
//!
//! - **Uploads**: `POST /api/v1/imports` accepts a multipart CSV file and
//!   answers `202 Accepted` with the new job while the import runs in the
//!   background
//! - **Status**: `GET /api/v1/imports/:id` returns the current job snapshot
//! - **Progress**: `GET /api/v1/imports/:id/events` streams snapshots as
//!   Server-Sent Events until the job finishes
//!
//! # Architecture
//!
//! Features are vertical slices with commands (writes) and queries (reads),
//! each a plain request type with a `handle` function over the
//! [`catalog_import::ImportService`].

pub mod api;
pub mod config;
pub mod error;
pub mod features;
pub mod middleware;

pub use error::AppError;

use axum::{response::IntoResponse, routing::get, Json, Router};
use serde_json::json;

/// Build the application router with all routes and middleware
pub fn create_router(state: features::FeatureState, config: &config::Config) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", features::router(state))
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
