//! Catalog Server - Main entry point

use anyhow::{Context, Result};
use catalog_common::logging::{init_logging, LogConfig};
use catalog_import::{
    ImportService, InMemoryJobRepository, InMemoryProductStore, JobRepository, NoopNotifier,
    NotificationSink, PgJobRepository, PgProductStore, ProductStore, WebhookNotifier,
};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tracing::info;

use catalog_server::{
    config::{Config, StorageBackend},
    create_router, features,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with configuration from environment
    let log_config = LogConfig::builder()
        .log_file_prefix("catalog-server")
        .filter_directives("catalog_server=debug,catalog_import=debug,tower_http=debug,sqlx=info")
        .build();

    // Environment variables take precedence
    let log_config = LogConfig::from_env().unwrap_or(log_config);

    let _guard = init_logging(&log_config)?;

    info!("Starting Catalog Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let (products, jobs) = stores(&config).await?;
    let notifier = notifier(&config)?;

    tokio::fs::create_dir_all(&config.import.upload_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create upload directory {}",
                config.import.upload_dir.display()
            )
        })?;

    let imports = ImportService::new(products, jobs, notifier, config.import.clone());

    let state = features::FeatureState {
        imports,
        upload_body_limit: config.upload_body_limit(),
    };

    let app = create_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

async fn stores(config: &Config) -> Result<(Arc<dyn ProductStore>, Arc<dyn JobRepository>)> {
    match config.storage {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, products and jobs are lost on restart");
            Ok((
                Arc::new(InMemoryProductStore::new()),
                Arc::new(InMemoryJobRepository::new()),
            ))
        },
        StorageBackend::Postgres => {
            let db_pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
                .connect(&config.database.url)
                .await
                .context("Failed to connect to database")?;

            info!("Database connection pool established");

            sqlx::migrate!("../../migrations")
                .run(&db_pool)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

            info!("Database migrations completed");

            Ok((
                Arc::new(PgProductStore::new(db_pool.clone())),
                Arc::new(PgJobRepository::new(db_pool)),
            ))
        },
    }
}

fn notifier(config: &Config) -> Result<Arc<dyn NotificationSink>> {
    if config.webhooks.endpoints.is_empty() {
        info!("No webhook endpoints configured");
        return Ok(Arc::new(NoopNotifier));
    }

    info!(
        endpoints = config.webhooks.endpoints.len(),
        "Webhook notifications enabled"
    );
    Ok(Arc::new(WebhookNotifier::new(
        config.webhooks.endpoints.clone(),
        config.webhooks.timeout(),
    )?))
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
