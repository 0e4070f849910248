use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Url};

/// Status and body of a completed exchange with the signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// 200 through 299 inclusive.
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

/// The exchange never produced a response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    /// Connection-level failures that are worth another attempt.
    pub retryable: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            message: message.into(),
            retryable,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let retryable = err.is_connect() || err.is_timeout() || err.is_request() || err.is_body();
        Self::new(err.to_string(), retryable)
    }
}

/// Why a single signing attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    Transport(TransportError),
    Status(RawResponse),
}

/// Carries one serialized request to the signer.
#[async_trait]
pub trait SignerTransport: Send + Sync {
    async fn post(&self, body: Vec<u8>) -> Result<RawResponse, TransportError>;
}

/// Posts JSON to a fixed signer URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    url: Url,
}

impl HttpTransport {
    pub fn new(url: Url, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building signer http client")?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl SignerTransport for HttpTransport {
    async fn post(&self, body: Vec<u8>) -> Result<RawResponse, TransportError> {
        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(RawResponse { status, body })
    }
}
