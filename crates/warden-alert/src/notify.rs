//! Alert delivery.
//!
//! Notifiers are fire-and-forget: a failed delivery is logged and reported
//! as `false`, never retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use warden_core::EscalationLevel;
use warden_core::config::NotifierConfig;
use warden_health::HttpClient;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one alert. Returns whether delivery succeeded.
    async fn send(&self, service: &str, level: EscalationLevel, body: &str) -> bool;
}

/// Build the notifier selected in config.
pub fn from_config(
    config: &NotifierConfig,
    timeout: Duration,
) -> Result<Arc<dyn Notifier>, rustls::Error> {
    Ok(match config {
        NotifierConfig::Log => Arc::new(LogNotifier),
        NotifierConfig::Webhook { url } => Arc::new(WebhookNotifier::new(url, timeout)?),
    })
}

/// Writes alerts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, service: &str, level: EscalationLevel, body: &str) -> bool {
        warn!(%service, %level, "alert\n{body}");
        true
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    service: &'a str,
    level: EscalationLevel,
    body: &'a str,
}

/// POSTs alerts as JSON (`{"service", "level", "body"}`) to a webhook URL.
#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    client: HttpClient,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, rustls::Error> {
        Ok(Self::with_client(url, HttpClient::new(timeout)?))
    }

    pub fn with_client(url: &str, client: HttpClient) -> Self {
        Self {
            url: url.to_string(),
            client,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, service: &str, level: EscalationLevel, body: &str) -> bool {
        let payload = WebhookPayload {
            service,
            level,
            body,
        };
        let json = match serde_json::to_vec(&payload) {
            Ok(json) => json,
            Err(e) => {
                warn!(%service, error = %e, "failed to encode webhook payload");
                return false;
            }
        };

        match self.client.post_json(&self.url, json).await {
            Ok(status) if status.is_success() => {
                info!(%service, %level, "webhook alert delivered");
                true
            }
            Ok(status) => {
                warn!(%service, %status, "webhook rejected alert");
                false
            }
            Err(e) => {
                warn!(%service, error = %e, "webhook delivery failed");
                false
            }
        }
    }
}
