//! Catalog Import Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Asynchronous CSV product imports with live progress.
//!
//! # Pipeline
//!
//! - [`parser`]: streaming CSV rows with tolerant header handling
//! - [`validator`]: SKU and price normalization
//! - [`resolver`]: last-occurrence-wins deduplication by SKU
//! - [`tracker`]: job lifecycle and outcome counters
//! - [`progress`]: live snapshots for any number of readers
//! - [`pipeline`]: the executor tying the above together
//! - [`service`]: submission, background execution and status reads
//!
//! # Example
//!
//! ```no_run
//! use catalog_import::{ImportConfig, ImportService, InMemoryJobRepository, InMemoryProductStore, NoopNotifier};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = ImportService::new(
//!         Arc::new(InMemoryProductStore::new()),
//!         Arc::new(InMemoryJobRepository::new()),
//!         Arc::new(NoopNotifier),
//!         ImportConfig::default(),
//!     );
//!
//!     let file = tokio::fs::File::open("products.csv").await?;
//!     let job = service.submit(file, "products.csv").await?;
//!
//!     let mut progress = service.subscribe(job.id).await?;
//!     while let Some(snapshot) = progress.next().await {
//!         println!("{} {:.1}%", snapshot.status(), snapshot.progress_percentage);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod progress;
pub mod resolver;
pub mod retry;
pub mod service;
pub mod storage;
pub mod tracker;
pub mod types;
pub mod validator;
pub mod webhooks;

pub use config::{ImportConfig, WebhookConfig};
pub use error::{ImportError, Result};
pub use pipeline::ImportPipeline;
pub use progress::{ProgressHub, ProgressStream};
pub use retry::RetryPolicy;
pub use service::ImportService;
pub use storage::{
    InMemoryJobRepository, InMemoryProductStore, JobRepository, ProductStore, StorageError,
};
#[cfg(feature = "database")]
pub use storage::{PgJobRepository, PgProductStore};
pub use types::{ImportJob, ImportStatus, JobSnapshot, RowOutcome, UpsertOutcome};
pub use webhooks::{EventType, NoopNotifier, NotificationSink, WebhookEndpoint, WebhookNotifier};
