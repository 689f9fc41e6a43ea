pub mod image;

pub use image::{HttpImageFetcher, ImageError, ImageFetcher};

use crate::config::PredictionConfig;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

// ── Port ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Lower-cased, trimmed creature name.
    pub name: String,
    pub confidence: f64,
    pub latency_ms: Option<u64>,
    pub quota_remaining: Option<u64>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PredictionError {
    #[error("prediction service is not configured")]
    Disabled,
    #[error("prediction quota exhausted")]
    QuotaExhausted,
    #[error("prediction rejected [{status}]: {message}")]
    Rejected {
        status: u16,
        retry: bool,
        message: String,
    },
    #[error("prediction payload malformed: {message}")]
    Malformed { message: String },
    #[error("prediction request failed: {0}")]
    Network(String),
}

impl PredictionError {
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Disabled | Self::QuotaExhausted => false,
            Self::Rejected { retry, .. } => *retry,
            Self::Malformed { .. } | Self::Network(_) => true,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::QuotaExhausted => "quota_exhausted",
            Self::Rejected { .. } => "rejected",
            Self::Malformed { .. } => "malformed",
            Self::Network(_) => "network",
        }
    }
}

/// Image classifier that names the creature in a spawn image.
#[async_trait]
pub trait Predictor: Send + Sync {
    fn name(&self) -> &str;

    async fn predict(&self, image: Vec<u8>) -> Result<Prediction, PredictionError>;
}

// ── HTTP client ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuotaStatus {
    #[serde(default)]
    pub remaining: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub used: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PredictBody {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    pokemon: Option<String>,
    #[serde(default)]
    confidence: Option<Value>,
    #[serde(default)]
    latency_ms: Option<u64>,
    #[serde(default)]
    quota_remaining: Option<u64>,
    #[serde(default)]
    retry: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    #[serde(default)]
    status: String,
}

pub struct HttpPredictionClient {
    http: reqwest::Client,
    predict_url: String,
    base_url: String,
    api_key: String,
}

impl HttpPredictionClient {
    /// Returns `None` unless both the URL and key are configured.
    pub fn from_config(config: &PredictionConfig) -> anyhow::Result<Option<Self>> {
        let (Some(url), Some(key)) = (
            config.api_url.as_deref().map(str::trim).filter(|u| !u.is_empty()),
            config.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()),
        ) else {
            return Ok(None);
        };
        Self::new(url, key, Duration::from_secs(config.timeout_secs)).map(Some)
    }

    pub fn new(api_url: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let (predict_url, base_url) = normalize_urls(api_url);
        Ok(Self {
            http,
            predict_url,
            base_url,
            api_key: api_key.to_string(),
        })
    }

    pub fn predict_url(&self) -> &str {
        &self.predict_url
    }

    /// GET {base}/api-status → `status == "online"`.
    pub async fn service_online(&self) -> anyhow::Result<bool> {
        let resp = self
            .http
            .get(format!("{}/api-status", self.base_url))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Ok(false);
        }
        let body: StatusBody = resp.json().await?;
        Ok(body.status.eq_ignore_ascii_case("online"))
    }

    /// GET {base}/balance with the bearer key.
    pub async fn quota(&self) -> anyhow::Result<QuotaStatus> {
        let resp = self
            .http
            .get(format!("{}/balance", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("quota lookup failed with HTTP {}", status.as_u16());
        }
        Ok(resp.json().await?)
    }
}

/// `(predict endpoint, service base)` from either form of the configured URL.
fn normalize_urls(api_url: &str) -> (String, String) {
    let trimmed = api_url.trim().trim_end_matches('/');
    match trimmed.strip_suffix("/predict") {
        Some(base) => (trimmed.to_string(), base.to_string()),
        None => (format!("{trimmed}/predict"), trimmed.to_string()),
    }
}

fn confidence_value(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[async_trait]
impl Predictor for HttpPredictionClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn predict(&self, image: Vec<u8>) -> Result<Prediction, PredictionError> {
        let part = Part::bytes(image)
            .file_name("pokemon.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| PredictionError::Network(e.to_string()))?;
        let form = Form::new().part("image", part);

        let resp = self
            .http
            .post(&self.predict_url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PredictionError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        if status == 429 {
            return Err(PredictionError::QuotaExhausted);
        }

        let text = resp
            .text()
            .await
            .map_err(|e| PredictionError::Network(e.to_string()))?;
        let body: PredictBody = serde_json::from_str(&text).unwrap_or_default();

        if status != 200 {
            return Err(PredictionError::Rejected {
                status,
                retry: body.retry != Some(false),
                message: body.error.unwrap_or_else(|| "prediction_rejected".into()),
            });
        }

        let name = body
            .pokemon
            .as_deref()
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty());
        let (true, Some(name)) = (body.success, name) else {
            return Err(PredictionError::Malformed {
                message: body.error.unwrap_or_else(|| "prediction_failed".into()),
            });
        };

        Ok(Prediction {
            name,
            confidence: confidence_value(body.confidence.as_ref()),
            latency_ms: body.latency_ms,
            quota_remaining: body.quota_remaining,
        })
    }
}
