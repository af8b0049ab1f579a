//! Catalog Import - command line product importer

use anyhow::{Context, Result};
use catalog_common::logging::{init_logging, LogConfig, LogLevel};
use catalog_import::parser;
use catalog_import::resolver::SkuIndex;
use catalog_import::validator::{self, RowRejection};
use catalog_import::{
    ImportConfig, ImportService, ImportStatus, InMemoryJobRepository, InMemoryProductStore,
    JobRepository, NoopNotifier, NotificationSink, ProductStore, WebhookConfig, WebhookNotifier,
};
use clap::Parser;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "catalog-import")]
#[command(author, version, about = "Import product catalogs from CSV files")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Import a CSV file
    Run {
        /// CSV file with sku, name, description and price columns
        file: PathBuf,

        /// PostgreSQL URL. Without it the import runs against an in-memory
        /// store and nothing is kept.
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,

        /// Records per upsert batch
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Report what an import of the file would do, without writing anything
    Inspect {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("catalog-import")
        .build();

    // Environment variables take precedence
    let log_config = LogConfig::from_env().unwrap_or(log_config);
    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Run {
            file,
            database_url,
            batch_size,
        } => run(&file, database_url.as_deref(), batch_size).await,
        Command::Inspect { file } => inspect(&file).await,
    }
}

async fn run(file: &Path, database_url: Option<&str>, batch_size: Option<usize>) -> Result<()> {
    let mut config = ImportConfig::from_env()?;
    if let Some(batch_size) = batch_size {
        config.batch_size = batch_size;
    }
    config.upload_dir = std::env::temp_dir().join("catalog-import");
    config.validate()?;

    let (products, jobs) = stores(database_url).await?;
    let notifier = notifier(WebhookConfig::from_env()?)?;
    let service = ImportService::new(products, jobs, notifier, config);

    let filename = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());
    let source = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;

    let job = service.submit(source, &filename).await?;
    info!(job_id = %job.id, "Import started");

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} rows ({eta})")?
            .progress_chars("#>-"),
    );

    let mut progress = service.subscribe(job.id).await?;
    let mut last = None;
    while let Some(snapshot) = progress.next().await {
        pb.set_length(snapshot.job.total_rows);
        pb.set_position(snapshot.job.processed_rows);
        pb.set_message(format!("{} ({})", filename, snapshot.status()));
        last = Some(snapshot);
    }
    pb.finish_and_clear();

    let Some(last) = last else {
        anyhow::bail!("Lost track of import job {}", job.id);
    };
    let job = last.job;

    println!("Import {}: {}", job.id, job.status);
    println!("  total rows:  {}", job.total_rows);
    println!("  created:     {}", job.successful_rows);
    println!("  duplicates:  {}", job.duplicate_rows);
    println!("  failed:      {}", job.failed_rows);
    println!("  skipped:     {}", job.skipped_rows);

    if job.status == ImportStatus::Failed {
        anyhow::bail!(
            "Import failed: {}",
            job.error_message.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    Ok(())
}

#[cfg(feature = "database")]
async fn stores(
    database_url: Option<&str>,
) -> Result<(Arc<dyn ProductStore>, Arc<dyn JobRepository>)> {
    use catalog_import::{PgJobRepository, PgProductStore};
    use sqlx::postgres::PgPoolOptions;

    let Some(url) = database_url else {
        warn!("No database URL given, importing into an in-memory store");
        return Ok(in_memory());
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await
        .context("Failed to connect to database")?;
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    Ok((
        Arc::new(PgProductStore::new(pool.clone())),
        Arc::new(PgJobRepository::new(pool)),
    ))
}

#[cfg(not(feature = "database"))]
async fn stores(
    database_url: Option<&str>,
) -> Result<(Arc<dyn ProductStore>, Arc<dyn JobRepository>)> {
    if database_url.is_some() {
        anyhow::bail!("Database support not enabled. Rebuild with --features database");
    }
    warn!("Importing into an in-memory store, nothing will be kept");
    Ok(in_memory())
}

fn in_memory() -> (Arc<dyn ProductStore>, Arc<dyn JobRepository>) {
    (
        Arc::new(InMemoryProductStore::new()),
        Arc::new(InMemoryJobRepository::new()),
    )
}

fn notifier(config: WebhookConfig) -> Result<Arc<dyn NotificationSink>> {
    if config.endpoints.is_empty() {
        return Ok(Arc::new(NoopNotifier));
    }
    let timeout = config.timeout();
    Ok(Arc::new(WebhookNotifier::new(config.endpoints, timeout)?))
}

async fn inspect(file: &Path) -> Result<()> {
    let mut reader = parser::open(file).await?;
    let missing = reader.missing_columns();

    let mut index = SkuIndex::new();
    let mut valid = 0u64;
    let mut missing_sku = 0u64;
    let mut rejected = 0u64;
    let mut without_price = 0u64;

    while let Some(row) = reader.next_row().await? {
        match validator::normalize(&row) {
            Ok(record) => {
                valid += 1;
                if record.price.is_none() {
                    without_price += 1;
                }
                index.observe(&record.sku, row.row_number);
            },
            Err(RowRejection::MissingSku) => missing_sku += 1,
            Err(RowRejection::Rejected(_)) => rejected += 1,
        }
    }

    let rows = reader.rows_read();
    println!("{}", file.display());
    println!("  data rows:          {}", rows);
    println!("  distinct SKUs:      {}", index.distinct());
    println!("  repeated SKU rows:  {}", valid - index.distinct() as u64);
    println!("  missing SKU:        {}", missing_sku);
    println!("  rejected:           {}", rejected);
    println!("  without price:      {}", without_price);
    if !missing.is_empty() {
        println!("  missing columns:    {}", missing.join(", "));
    }
    if rows == 0 {
        warn!("File contains no data rows and would fail to import");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_notifier_without_endpoints() {
        assert!(notifier(WebhookConfig::default()).is_ok());
    }

    #[test]
    fn test_notifier_with_endpoints() {
        let config = WebhookConfig {
            endpoints: WebhookConfig::parse_endpoints("http://localhost:9/hooks").unwrap(),
            timeout_secs: 3,
        };
        assert_eq!(config.timeout(), std::time::Duration::from_secs(3));
        assert!(notifier(config).is_ok());
    }
}
