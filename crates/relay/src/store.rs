use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};

use crate::csr::CertificateSigningRequest;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(String),
    #[error("conflicting update: {0}")]
    Conflict(String),
    #[error("store rejected update with status {code}: {reason}")]
    Rejected { code: u16, reason: String },
    #[error("unable to decode store response: {0}")]
    Decode(String),
}

/// Persists the status of certificate signing requests.
///
/// Implementations are expected to provide per-object consistency; a
/// concurrent update surfaces as `StoreError::Conflict`.
#[async_trait]
pub trait CsrStore: Send + Sync {
    async fn update_status(
        &self,
        csr: &CertificateSigningRequest,
    ) -> Result<CertificateSigningRequest, StoreError>;
}

/// Store reached over HTTP: `PUT {base}/csrs/{name}/status`.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base_url: Url,
}

impl HttpStore {
    pub fn new(base_url: Url, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building store http client")?;
        Ok(Self { client, base_url })
    }

    fn status_url(&self, name: &str) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Transport(format!("{} cannot be a base url", self.base_url)))?
            .pop_if_empty()
            .extend(["csrs", name, "status"]);
        Ok(url)
    }
}

#[async_trait]
impl CsrStore for HttpStore {
    async fn update_status(
        &self,
        csr: &CertificateSigningRequest,
    ) -> Result<CertificateSigningRequest, StoreError> {
        let url = self.status_url(csr.name())?;
        let response = self
            .client
            .put(url)
            .json(csr)
            .send()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<CertificateSigningRequest>()
                .await
                .map_err(|err| StoreError::Decode(err.to_string()));
        }

        let reason = response
            .text()
            .await
            .unwrap_or_else(|err| format!("store response body error: {err}"));
        match status {
            StatusCode::CONFLICT => Err(StoreError::Conflict(reason)),
            _ => Err(StoreError::Rejected {
                code: status.as_u16(),
                reason,
            }),
        }
    }
}
