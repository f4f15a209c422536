//! Best-effort mirroring of finished interactions to an automation webhook.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::WebhookConfig;
use crate::event::Sender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Text,
    Photo,
}

/// Flat record of one completed interaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub user_id: u64,
    pub username: String,
    /// Input text, or a summary for binary input.
    pub message: String,
    pub reply: String,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryRecord {
    /// `reply` is always the finalized outbound text, never an error.
    pub fn new(kind: EventKind, sender: &Sender, message: String, reply: &str) -> Self {
        Self {
            kind,
            user_id: sender.id,
            username: sender.display_name().to_string(),
            message,
            reply: reply.to_string(),
            timestamp: Utc::now(),
        }
    }
}

pub fn photo_summary(image: &[u8]) -> String {
    format!("[photo: {} bytes]", image.len())
}

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn deliver(&self, record: &TelemetryRecord) -> Result<()>;
}

/// POSTs records as JSON to the configured URL. Without a URL it does nothing.
pub struct WebhookRelay {
    client: reqwest::Client,
    url: Option<String>,
}

impl WebhookRelay {
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }
}

#[async_trait]
impl TelemetrySink for WebhookRelay {
    async fn deliver(&self, record: &TelemetryRecord) -> Result<()> {
        let Some(url) = self.url.as_deref() else {
            return Ok(());
        };

        debug!("Mirroring {:?} interaction to webhook: {}", record.kind, url);

        let response = self
            .client
            .post(url)
            .json(record)
            .send()
            .await
            .context("Failed to send webhook request")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Webhook responded with {}", status);
        }
        Ok(())
    }
}

/// Delivers `record` on its own task and waits at most `limit` for it.
/// Errors, panics and timeouts are logged and dropped.
pub async fn mirror(sink: Arc<dyn TelemetrySink>, record: TelemetryRecord, limit: Duration) {
    let mut task = tokio::spawn(async move { sink.deliver(&record).await });

    match tokio::time::timeout(limit, &mut task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!("Telemetry delivery failed: {:#}", e),
        Ok(Err(e)) => warn!("Telemetry task aborted: {}", e),
        Err(_) => {
            task.abort();
            warn!("Telemetry delivery timed out after {:?}", limit);
        }
    }
}
