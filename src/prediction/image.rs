use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use std::time::Duration;
use thiserror::Error;

const MAX_REDIRECTS: usize = 5;
const BROWSER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/apng,image/*,*/*;q=0.8";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ImageError {
    #[error("image download returned HTTP {0}")]
    Status(u16),
    #[error("image download returned an empty body")]
    Empty,
    #[error("image download failed: {0}")]
    Transport(String),
}

/// Downloads spawn images.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError>;
}

pub struct HttpImageFetcher {
    http: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        let resp = self
            .http
            .get(url)
            .header(USER_AGENT, BROWSER_AGENT)
            .header(ACCEPT, IMAGE_ACCEPT)
            .send()
            .await
            .map_err(|e| ImageError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ImageError::Status(status.as_u16()));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ImageError::Transport(e.to_string()))?;
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        Ok(bytes.to_vec())
    }
}
