use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::SignError;
use crate::csr::CertificateSigningRequest;

/// Trait for delegating a certificate request to an external authority.
///
/// Implementations return only the issued certificate; merging it into the
/// request is the caller's job.
#[async_trait]
pub trait CertificateSigner: Send + Sync {
    /// Sign `csr`, giving up once `cancel` fires.
    async fn sign(
        &self,
        csr: &CertificateSigningRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, SignError>;
}
