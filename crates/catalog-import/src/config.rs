//! Import configuration
//!
//! Values come from `IMPORT_*` and `WEBHOOK_*` environment variables, falling
//! back to the defaults below.

use crate::retry::{RetryPolicy, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_MS};
use crate::webhooks::WebhookEndpoint;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_UPLOAD_DIR: &str = "./uploads";
pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_PROGRESS_INTERVAL_ROWS: u64 = 500;
pub const DEFAULT_MAX_ROWS: u64 = 500_000;
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 256 * 1024 * 1024;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Directory uploads are spooled to while their job runs
    pub upload_dir: PathBuf,
    /// Records per upsert batch
    pub batch_size: usize,
    /// Rows between progress publications
    pub progress_interval_rows: u64,
    /// Data rows accepted per file
    pub max_rows: u64,
    pub max_concurrent_jobs: usize,
    pub max_upload_bytes: u64,
    /// Repository polling interval for readers without a live channel
    pub poll_interval_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval_rows: DEFAULT_PROGRESS_INTERVAL_ROWS,
            max_rows: DEFAULT_MAX_ROWS,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            retry: RetryPolicy::default(),
        }
    }
}

impl ImportConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            upload_dir: std::env::var("IMPORT_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            batch_size: env_or("IMPORT_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            progress_interval_rows: env_or(
                "IMPORT_PROGRESS_INTERVAL_ROWS",
                DEFAULT_PROGRESS_INTERVAL_ROWS,
            ),
            max_rows: env_or("IMPORT_MAX_ROWS", DEFAULT_MAX_ROWS),
            max_concurrent_jobs: env_or("IMPORT_MAX_CONCURRENT_JOBS", DEFAULT_MAX_CONCURRENT_JOBS),
            max_upload_bytes: env_or("IMPORT_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            poll_interval_ms: env_or("IMPORT_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS),
            retry: RetryPolicy {
                max_attempts: env_or("IMPORT_RETRY_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
                base_delay_ms: env_or("IMPORT_RETRY_BASE_DELAY_MS", DEFAULT_BASE_DELAY_MS),
                max_delay_ms: env_or("IMPORT_RETRY_MAX_DELAY_MS", DEFAULT_MAX_DELAY_MS),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("IMPORT_BATCH_SIZE must be greater than 0");
        }
        if self.progress_interval_rows == 0 {
            anyhow::bail!("IMPORT_PROGRESS_INTERVAL_ROWS must be greater than 0");
        }
        if self.max_rows == 0 {
            anyhow::bail!("IMPORT_MAX_ROWS must be greater than 0");
        }
        if self.max_concurrent_jobs == 0 {
            anyhow::bail!("IMPORT_MAX_CONCURRENT_JOBS must be greater than 0");
        }
        if self.max_upload_bytes == 0 {
            anyhow::bail!("IMPORT_MAX_UPLOAD_BYTES must be greater than 0");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("IMPORT_RETRY_ATTEMPTS must be at least 1");
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            anyhow::bail!("IMPORT_RETRY_BASE_DELAY_MS cannot exceed IMPORT_RETRY_MAX_DELAY_MS");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub endpoints: Vec<WebhookEndpoint>,
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            timeout_secs: DEFAULT_WEBHOOK_TIMEOUT_SECS,
        }
    }
}

impl WebhookConfig {
    /// `WEBHOOK_URLS` holds comma-separated `event=url` pairs; `*=url` or a
    /// bare url receives every event.
    pub fn from_env() -> Result<Self> {
        let endpoints = match std::env::var("WEBHOOK_URLS") {
            Ok(raw) => Self::parse_endpoints(&raw)?,
            Err(_) => Vec::new(),
        };

        let config = Self {
            endpoints,
            timeout_secs: env_or("WEBHOOK_TIMEOUT_SECS", DEFAULT_WEBHOOK_TIMEOUT_SECS),
        };

        if config.timeout_secs == 0 {
            anyhow::bail!("WEBHOOK_TIMEOUT_SECS must be greater than 0");
        }
        Ok(config)
    }

    pub fn parse_endpoints(raw: &str) -> Result<Vec<WebhookEndpoint>> {
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                entry
                    .parse()
                    .with_context(|| format!("Invalid WEBHOOK_URLS entry '{}'", entry))
            })
            .collect()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::webhooks::EventType;

    #[test]
    fn test_defaults_are_valid() {
        let config = ImportConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_rows, 500_000);
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = ImportConfig {
            batch_size: 0,
            ..ImportConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_retry_delays() {
        let config = ImportConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 10_000,
                max_delay_ms: 100,
            },
            ..ImportConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_webhook_endpoints() {
        let endpoints = WebhookConfig::parse_endpoints(
            " product_imported=https://a.example.com/hook , https://b.example.com/all ,",
        )
        .unwrap();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].event, Some(EventType::ProductImported));
        assert_eq!(endpoints[1].event, None);

        assert!(WebhookConfig::parse_endpoints("not a url").is_err());
    }
}
