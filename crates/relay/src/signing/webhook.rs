use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::retry::{BackoffError, RetryPolicy, with_backoff};
use super::signer::CertificateSigner;
use super::transport::{AttemptFailure, RawResponse, SignerTransport};
use super::{ErrorEnvelope, SignError};
use crate::csr::{CertificateSigningRequest, Field};
use crate::metrics::{MetricsRecorder, OutboundStatus, SIGN_CALL};

/// Retries connection failures, 429 and 5xx responses.
pub fn default_should_retry(failure: &AttemptFailure) -> bool {
    match failure {
        AttemptFailure::Transport(err) => err.retryable,
        AttemptFailure::Status(response) => response.status == 429 || response.status >= 500,
    }
}

/// Signs requests by posting them to a webhook that answers with the
/// request object carrying `status.certificate`.
pub struct WebhookSigner {
    transport: Arc<dyn SignerTransport>,
    metrics: Arc<dyn MetricsRecorder>,
    policy: RetryPolicy,
    should_retry: fn(&AttemptFailure) -> bool,
}

impl WebhookSigner {
    pub fn new(transport: Arc<dyn SignerTransport>, metrics: Arc<dyn MetricsRecorder>) -> Self {
        Self {
            transport,
            metrics,
            policy: RetryPolicy::default(),
            should_retry: default_should_retry,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retry_predicate(mut self, should_retry: fn(&AttemptFailure) -> bool) -> Self {
        self.should_retry = should_retry;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// One outbound call. Every attempt is recorded, not just the last.
    async fn attempt(&self, body: Vec<u8>) -> Result<RawResponse, AttemptFailure> {
        let mut in_flight = InFlight {
            metrics: self.metrics.as_ref(),
            finished: false,
        };
        let result = self.transport.post(body).await;
        in_flight.finished = true;

        match result {
            Ok(response) if response.is_success() => {
                self.metrics.outbound_call(SIGN_CALL, OutboundStatus::Ok);
                Ok(response)
            }
            Ok(response) => {
                self.metrics.outbound_call(SIGN_CALL, OutboundStatus::Error);
                debug!(status = response.status, "signer returned unsuccessful status");
                Err(AttemptFailure::Status(response))
            }
            Err(err) => {
                self.metrics.outbound_call(SIGN_CALL, OutboundStatus::Error);
                debug!(error = %err, retryable = err.retryable, "signer call failed");
                Err(AttemptFailure::Transport(err))
            }
        }
    }
}

/// Records an outbound error for an attempt dropped before it finished,
/// which happens when cancellation interrupts the call.
struct InFlight<'a> {
    metrics: &'a dyn MetricsRecorder,
    finished: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.metrics.outbound_call(SIGN_CALL, OutboundStatus::Error);
        }
    }
}

/// Prefers the signer's own error message over the raw failure.
fn failure_error(failure: AttemptFailure) -> SignError {
    match failure {
        AttemptFailure::Transport(err) => SignError::Transport(err),
        AttemptFailure::Status(response) => match ErrorEnvelope::from_body(&response.body) {
            Some(remote) => remote.into(),
            None => SignError::UnsuccessfulStatus {
                code: response.status,
            },
        },
    }
}

#[async_trait]
impl CertificateSigner for WebhookSigner {
    async fn sign(
        &self,
        csr: &CertificateSigningRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, SignError> {
        let body = serde_json::to_vec(csr).map_err(|e| SignError::Encode(e.to_string()))?;

        let response = match with_backoff(
            &self.policy,
            cancel,
            || self.attempt(body.clone()),
            self.should_retry,
        )
        .await
        {
            Ok(response) => response,
            Err(BackoffError::Cancelled) => return Err(SignError::Cancelled),
            Err(BackoffError::Failed { attempts, last }) => {
                let err = failure_error(last);
                warn!(csr = csr.name(), attempts, error = %err, "error contacting signer");
                return Err(err);
            }
        };

        // Decode failures are terminal: retrying a malformed success won't help.
        let issued: CertificateSigningRequest = serde_json::from_slice(&response.body)
            .map_err(|e| SignError::Decode(e.to_string()))?;
        match issued.status.certificate {
            Field::Value(certificate) if !certificate.is_empty() => Ok(certificate),
            _ => Err(SignError::Decode("response carried no certificate".to_string())),
        }
    }
}
