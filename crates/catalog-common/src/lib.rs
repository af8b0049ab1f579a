//! Catalog Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging setup, and error handling for the catalog workspace.
//!
//! - **Error Handling**: [`CatalogError`] for rejected shared values
//! - **Logging**: environment-driven `tracing` subscriber setup
//! - **Types**: product records shared by the importer and the server

pub mod error;
pub mod logging;
pub mod types;

pub use error::CatalogError;
