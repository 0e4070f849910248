mod error;
mod retry;
mod signer;
mod transport;
mod webhook;

pub use error::{ErrorEnvelope, RemoteError, SignError};
pub use retry::{BackoffError, DEFAULT_INITIAL_BACKOFF, RetryPolicy, with_backoff};
pub use signer::CertificateSigner;
pub use transport::{AttemptFailure, HttpTransport, RawResponse, SignerTransport, TransportError};
pub use webhook::{WebhookSigner, default_should_retry};
