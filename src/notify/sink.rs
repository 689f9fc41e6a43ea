use super::payload::WebhookPayload;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("destination rate limited the request (HTTP 429)")]
    RateLimited,
    #[error("destination answered HTTP {0}")]
    Status(u16),
    #[error("delivery failed: {0}")]
    Transport(String),
}

impl DeliveryError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

/// Final hop of the notification pipeline.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn deliver(&self, destination: &str, payload: &WebhookPayload)
    -> Result<(), DeliveryError>;
}

pub struct HttpWebhookSink {
    http: reqwest::Client,
}

impl HttpWebhookSink {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl WebhookSink for HttpWebhookSink {
    async fn deliver(
        &self,
        destination: &str,
        payload: &WebhookPayload,
    ) -> Result<(), DeliveryError> {
        let resp = self
            .http
            .post(destination)
            .json(payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(DeliveryError::RateLimited);
        }
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }
        Ok(())
    }
}
