//! Price feed fetcher
//!
//! One GET per call, no retry. Anything other than a 2xx response carrying a
//! JSON object within the size cap is a [`FetchError`].

use crate::config::HttpConfig;
use crate::error::{AmpsterError, Result};
use crate::price::PriceSnapshot;
use reqwest::header::{ACCEPT, USER_AGENT};
use std::time::Duration;
use thiserror::Error;

/// Why a price fetch failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("response body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("invalid JSON: {0}")]
    Parse(String),

    #[error("price document is not a JSON object")]
    NotAnObject,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// Source of price documents
#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<PriceSnapshot, FetchError>;
}

/// reqwest-backed fetcher with a hard timeout and body cap
pub struct HttpPriceFetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpPriceFetcher {
    pub fn new(cfg: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()
            .map_err(|e| AmpsterError::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            max_body_bytes: cfg.max_body_bytes,
        })
    }

    async fn read_capped(
        &self,
        mut response: reqwest::Response,
    ) -> std::result::Result<Vec<u8>, FetchError> {
        let limit = self.max_body_bytes;
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(FetchError::TooLarge { limit });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > limit {
                return Err(FetchError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait::async_trait]
impl PriceSource for HttpPriceFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<PriceSnapshot, FetchError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, concat!("ampster/", env!("CARGO_PKG_VERSION")))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = self.read_capped(response).await?;
        let value: serde_json::Value =
            serde_json::from_slice(&body).map_err(|e| FetchError::Parse(e.to_string()))?;
        match value {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(FetchError::NotAnObject),
        }
    }
}
