// src/services/notify.rs

//! Notification dispatch for newly stored listings.
//!
//! Best effort: one message per listing, no retry, no queue. A failed
//! dispatch is reported back to the caller and never aborts the run.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{ListingRecord, NotifyConfig, NotifyResult};
use crate::utils::http;

/// Destination accepting a text message.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, message: &str) -> Result<()>;
}

/// Discord-compatible webhook payload.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

/// Chat webhook sink (Discord and compatible endpoints).
pub struct WebhookSink {
    client: Client,
    url: Url,
}

impl WebhookSink {
    pub fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send(&self, message: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&WebhookPayload { content: message })
            .send()
            .await
            .map_err(|e| AppError::notify(format!("webhook request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            log::debug!("Webhook accepted message ({})", status);
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AppError::notify(format!(
                "webhook returned {}: {}",
                status,
                http::snippet(&body)
            )))
        }
    }
}

/// Formats listings and dispatches them through an optional sink.
#[derive(Clone)]
pub struct Notifier {
    sink: Option<Arc<dyn NotificationSink>>,
    template: String,
    timeout: Duration,
}

impl Notifier {
    pub fn new(
        sink: Option<Arc<dyn NotificationSink>>,
        template: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            sink,
            template: template.into(),
            timeout,
        }
    }

    /// Build from configuration; a blank webhook URL means no sink.
    pub fn from_config(config: &NotifyConfig, user_agent: &str) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let sink: Option<Arc<dyn NotificationSink>> = match config.webhook() {
            Some(raw) => {
                let url = Url::parse(raw)
                    .map_err(|e| AppError::config(format!("notify.webhook_url: {e}")))?;
                let client = http::create_async_client(user_agent, timeout)?;
                Some(Arc::new(WebhookSink::new(client, url)))
            }
            None => None,
        };
        Ok(Self::new(sink, config.template.clone(), timeout))
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Message text for a listing.
    pub fn message(&self, record: &ListingRecord) -> String {
        record.format(&self.template)
    }

    /// Announce one listing. Never returns an error.
    pub async fn notify(&self, record: &ListingRecord) -> NotifyResult {
        let message = self.message(record);
        log::info!("New listing: {} at {} ({})", record.title, record.company, record.job_url);

        let Some(sink) = &self.sink else {
            log::debug!("No notification sink configured; skipping");
            return NotifyResult::Skipped("no notification sink configured".into());
        };

        let outcome = match tokio::time::timeout(self.timeout, sink.send(&message)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::timeout("notification dispatch", self.timeout.as_secs())),
        };

        match outcome {
            Ok(()) => NotifyResult::Sent,
            Err(e) => {
                log::warn!("Notification for {} failed: {}", record.job_url, e);
                NotifyResult::Failed(e.to_string())
            }
        }
    }
}
