use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::csr::CertificateSigningRequest;
use crate::error::RelayError;
use crate::metrics::{
    EventRecorder, EventType, MetricsRecorder, OutboundStatus, SigningStatus, UPDATE_STATUS_CALL,
};
use crate::parse::parse_request;
use crate::signing::CertificateSigner;
use crate::store::CsrStore;
use crate::validator::{AUTH_FLOW_LABEL_NONE, ValidatorSet};

pub const SIGNING_ERROR_REASON: &str = "SigningError";

/// How an invocation ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// No approval condition yet; nothing was attempted.
    NotApproved,
    /// The request as persisted, differing from the input only in its certificate.
    Signed { csr: CertificateSigningRequest },
}

/// Relays approved requests to an external signer and persists the result.
///
/// Holds no per-request state; one instance serves concurrent invocations.
pub struct Relay {
    signer: Arc<dyn CertificateSigner>,
    store: Arc<dyn CsrStore>,
    validators: ValidatorSet,
    metrics: Arc<dyn MetricsRecorder>,
    events: Arc<dyn EventRecorder>,
}

impl Relay {
    pub fn new(
        signer: Arc<dyn CertificateSigner>,
        store: Arc<dyn CsrStore>,
        validators: ValidatorSet,
        metrics: Arc<dyn MetricsRecorder>,
        events: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            signer,
            store,
            validators,
            metrics,
            events,
        }
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    /// Signs and persists `csr` if it is approved.
    ///
    /// Records exactly one signing outcome for every approved request. A
    /// certificate already present is replaced by a fresh one. `csr` itself
    /// is never modified.
    pub async fn handle(
        &self,
        csr: &CertificateSigningRequest,
        cancel: &CancellationToken,
    ) -> Result<Outcome, RelayError> {
        if !csr.is_approved() {
            return Ok(Outcome::NotApproved);
        }
        info!(csr = csr.name(), "signer triggered");
        if csr.certificate().is_some() {
            debug!(csr = csr.name(), "request already carries a certificate, signing again");
        }

        let parsed = match parse_request(csr.spec.request.as_slice()) {
            Ok(parsed) => parsed,
            Err(source) => {
                self.metrics
                    .signing_outcome(AUTH_FLOW_LABEL_NONE, SigningStatus::ParseError);
                return Err(RelayError::Parse {
                    name: csr.name().to_string(),
                    source,
                });
            }
        };
        let label = self.validators.classify(csr, &parsed);

        let certificate = match self.signer.sign(csr, cancel).await {
            Ok(certificate) => certificate,
            Err(source) => {
                self.metrics.signing_outcome(label, SigningStatus::SignError);
                self.events.event(
                    &csr.object_ref(),
                    EventType::Warning,
                    SIGNING_ERROR_REASON,
                    &format!("error while calling signer: {source}"),
                );
                return Err(RelayError::Sign {
                    name: csr.name().to_string(),
                    source,
                });
            }
        };

        let issued = csr.with_certificate(certificate);
        if let Err(source) = self.store.update_status(&issued).await {
            self.metrics
                .outbound_call(UPDATE_STATUS_CALL, OutboundStatus::Error);
            self.metrics.signing_outcome(label, SigningStatus::UpdateError);
            return Err(RelayError::Persist {
                name: csr.name().to_string(),
                source,
            });
        }
        self.metrics.outbound_call(UPDATE_STATUS_CALL, OutboundStatus::Ok);
        self.metrics.signing_outcome(label, SigningStatus::Signed);
        info!(csr = csr.name(), label, "csr signed");

        Ok(Outcome::Signed { csr: issued })
    }
}
