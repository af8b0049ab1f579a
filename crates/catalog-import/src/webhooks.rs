//! Outbound notifications
//!
//! The pipeline only knows the [`NotificationSink`] contract. The webhook
//! implementation posts a JSON envelope to every endpoint subscribed to the
//! event:
//!
//! ```json
//! {"event": "product_imported", "timestamp": "2026-01-01T00:00:00Z", "payload": {...}}
//! ```
//!
//! with an `X-Webhook-Event` header. Delivery is best effort: failures are
//! logged and reported to the caller, who decides whether to care.

use async_trait::async_trait;
use catalog_common::CatalogError;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

pub const EVENT_HEADER: &str = "X-Webhook-Event";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ProductCreated,
    ProductUpdated,
    ProductDeleted,
    ProductImported,
    BulkDelete,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ProductCreated => "product_created",
            EventType::ProductUpdated => "product_updated",
            EventType::ProductDeleted => "product_deleted",
            EventType::ProductImported => "product_imported",
            EventType::BulkDelete => "bulk_delete",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "product_created" => Ok(EventType::ProductCreated),
            "product_updated" => Ok(EventType::ProductUpdated),
            "product_deleted" => Ok(EventType::ProductDeleted),
            "product_imported" => Ok(EventType::ProductImported),
            "bulk_delete" => Ok(EventType::BulkDelete),
            other => Err(CatalogError::invalid("webhook event", other)),
        }
    }
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("{failed} of {attempted} webhook deliveries for {event} failed")]
    Delivery {
        event: EventType,
        failed: usize,
        attempted: usize,
    },
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: EventType, payload: serde_json::Value) -> Result<(), NotifyError>;
}

/// Sink used when no endpoints are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl NotificationSink for NoopNotifier {
    async fn notify(&self, _event: EventType, _payload: serde_json::Value) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// One configured receiver. `event: None` subscribes to every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub url: String,
    pub event: Option<EventType>,
}

impl WebhookEndpoint {
    pub fn wants(&self, event: EventType) -> bool {
        self.event.map_or(true, |e| e == event)
    }
}

impl FromStr for WebhookEndpoint {
    type Err = CatalogError;

    /// Parses `event=url`, `*=url` or a bare `url`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (event, url) = match s.split_once('=') {
            Some((event, url)) if !event.contains("://") => (event.trim(), url.trim()),
            _ => ("*", s),
        };

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CatalogError::invalid("webhook url", url));
        }

        let event = match event {
            "*" | "" => None,
            name => Some(name.parse()?),
        };

        Ok(Self {
            url: url.to_string(),
            event,
        })
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    event: EventType,
    timestamp: DateTime<Utc>,
    payload: &'a serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub url: String,
    pub status: u16,
    pub elapsed_ms: u64,
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoints: Vec<WebhookEndpoint>,
}

impl WebhookNotifier {
    pub fn new(endpoints: Vec<WebhookEndpoint>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoints })
    }

    pub fn endpoints(&self) -> &[WebhookEndpoint] {
        &self.endpoints
    }

    async fn deliver(
        &self,
        endpoint: &WebhookEndpoint,
        event: EventType,
        envelope: &Envelope<'_>,
    ) -> Result<DeliveryReport, String> {
        let started = Instant::now();
        let response = self
            .client
            .post(&endpoint.url)
            .header(EVENT_HEADER, event.as_str())
            .json(envelope)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let report = DeliveryReport {
            url: endpoint.url.clone(),
            status: response.status().as_u16(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        if response.status().is_success() {
            Ok(report)
        } else {
            Err(format!("HTTP {} after {}ms", report.status, report.elapsed_ms))
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn notify(&self, event: EventType, payload: serde_json::Value) -> Result<(), NotifyError> {
        let envelope = Envelope {
            event,
            timestamp: Utc::now(),
            payload: &payload,
        };

        let targets: Vec<&WebhookEndpoint> =
            self.endpoints.iter().filter(|e| e.wants(event)).collect();
        let results = join_all(
            targets
                .iter()
                .map(|endpoint| self.deliver(endpoint, event, &envelope)),
        )
        .await;

        let mut failed = 0;
        for (endpoint, result) in targets.iter().zip(results) {
            match result {
                Ok(report) => info!(
                    %event,
                    url = %report.url,
                    status = report.status,
                    elapsed_ms = report.elapsed_ms,
                    "Webhook delivered"
                ),
                Err(error) => {
                    failed += 1;
                    warn!(%event, url = %endpoint.url, %error, "Webhook delivery failed");
                },
            }
        }

        if failed > 0 {
            return Err(NotifyError::Delivery {
                event,
                failed,
                attempted: targets.len(),
            });
        }
        Ok(())
    }
}
