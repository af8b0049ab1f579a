//! Imports feature module
//!
//! Upload a CSV file to start an import job, then follow it by polling or by
//! subscribing to its Server-Sent Events stream.

pub mod commands;
pub mod queries;
pub mod routes;

pub use routes::imports_routes;
