//! Anti-automation challenge solving.

use crate::accounts::Account;
use crate::config::SolverConfig;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SolverError {
    #[error("challenge solver is not configured")]
    Unavailable,
    #[error("challenge solver rejected the request: {0}")]
    Rejected(String),
    #[error("challenge solver timed out")]
    Timeout,
    #[error("challenge solver request failed: {0}")]
    Network(String),
    #[error("challenge solver returned an unreadable response: {0}")]
    Malformed(String),
}

/// Unblocks an account after a challenge, returning the bypass payload to
/// post into the originating channel.
#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    fn name(&self) -> &str;

    async fn solve(&self, account: &Account) -> Result<String, SolverError>;
}

pub struct HttpChallengeSolver {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    bypass_payload: String,
}

impl HttpChallengeSolver {
    /// Returns `None` unless both the URL and key are configured.
    pub fn from_config(config: &SolverConfig) -> anyhow::Result<Option<Self>> {
        let (Some(url), Some(key)) = (
            config.api_url.as_deref().map(str::trim).filter(|u| !u.is_empty()),
            config.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()),
        ) else {
            return Ok(None);
        };
        Self::new(
            url,
            key,
            Duration::from_secs(config.timeout_secs),
            &config.bypass_payload,
        )
        .map(Some)
    }

    pub fn new(
        api_url: &str,
        api_key: &str,
        timeout: Duration,
        bypass_payload: &str,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/solve-captcha", api_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            bypass_payload: bypass_payload.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn is_success_status(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        Some(Value::String(s)) => {
            matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "success" | "ok")
        }
        _ => false,
    }
}

fn is_success_message(value: Option<&Value>) -> bool {
    let Some(message) = value.and_then(Value::as_str) else {
        return false;
    };
    let message = message.to_lowercase();
    ["captcha solved", "solved successfully", "bypassed", "success"]
        .iter()
        .any(|phrase| message.contains(phrase))
}

fn is_solved(body: &Value) -> bool {
    is_success_status(body.get("status"))
        || is_success_status(body.get("success"))
        || is_success_status(body.get("result"))
        || is_success_message(body.get("message"))
}

#[async_trait]
impl ChallengeSolver for HttpChallengeSolver {
    fn name(&self) -> &str {
        "server-side bypass"
    }

    async fn solve(&self, account: &Account) -> Result<String, SolverError> {
        let Some(credential) = account.credential() else {
            return Err(SolverError::Rejected("account has no credential".into()));
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .header("x-license-key", &self.api_key)
            .json(&json!({ "uid": account.user_id, "token": credential }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SolverError::Timeout
                } else {
                    SolverError::Network(e.to_string())
                }
            })?;

        let text = resp.text().await.map_err(|e| {
            if e.is_timeout() {
                SolverError::Timeout
            } else {
                SolverError::Network(e.to_string())
            }
        })?;
        let body: Value =
            serde_json::from_str(&text).map_err(|e| SolverError::Malformed(e.to_string()))?;

        if !is_solved(&body) {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown response");
            return Err(SolverError::Rejected(message.to_string()));
        }

        Ok(body
            .get("payload")
            .and_then(Value::as_str)
            .filter(|payload| !payload.trim().is_empty())
            .map_or_else(|| self.bypass_payload.clone(), str::to_string))
    }
}
