//! Notification sinks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use super::types::{Notification, NotifyError};
use crate::config::NotifierConfig;

/// Delivers one notification. Implementations must be safe to call
/// concurrently.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns the name of this notifier implementation.
    fn name(&self) -> &str;

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes each notification as a structured log line.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            service = "notification-subscriber",
            action = "notify",
            order_id = notification.order_id,
            number = notification.number,
            from = %notification.from,
            to = %notification.to,
            changed_by = notification.changed_by.as_deref().unwrap_or(""),
            correlation_id = notification.correlation_id.as_deref().unwrap_or(""),
            "{}",
            notification.message()
        );
        Ok(())
    }
}

/// POSTs each notification as JSON to a fixed URL.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(NotifyError::Config(format!(
                "webhook url must start with http:// or https://, got {}",
                url
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.url).json(notification);
        if let Some(correlation_id) = &notification.correlation_id {
            request = request.header("x-request-id", correlation_id);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                NotifyError::Delivery(format!("webhook timed out: {}", e))
            } else {
                NotifyError::Delivery(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Delivery(format!(
                "webhook returned {}",
                status
            )));
        }

        debug!(order_id = notification.order_id, url = %self.url, "Webhook delivered");
        Ok(())
    }
}

/// Build the notifier selected by `config`: a webhook when a URL is set,
/// otherwise log lines.
pub fn create_notifier(config: &NotifierConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    match config.webhook_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => Ok(Arc::new(WebhookNotifier::new(
            url,
            Duration::from_secs(config.webhook_timeout_secs),
        )?)),
        _ => Ok(Arc::new(LogNotifier::new())),
    }
}
