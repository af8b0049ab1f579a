//! Feature modules implementing the catalog API
//!
//! Each feature is a vertical slice with its own commands, queries and routes.
//!
//! # Features
//!
//! - **imports**: CSV product import jobs and their progress
//!
//! # Architecture
//!
//! Each feature module follows the structure:
//! - `commands/` - Write operations
//! - `queries/` - Read operations
//! - `routes.rs` - HTTP route definitions
//!
//! Commands and queries are plain request types marked with the `mediator`
//! `Request` trait, each with a standalone `handle` function.

pub mod imports;

use axum::Router;
use catalog_import::ImportService;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// Import job submission and status reads
    pub imports: ImportService,
    /// Request body limit for uploads
    pub upload_body_limit: usize,
}

/// Creates the API router with all feature routes mounted
///
/// - `/imports` - CSV product imports
pub fn router(state: FeatureState) -> Router<()> {
    Router::new().nest(
        "/imports",
        imports::imports_routes(state.upload_body_limit).with_state(state.imports.clone()),
    )
}
