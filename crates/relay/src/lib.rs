pub mod config;
pub mod csr;
pub mod error;
pub mod metrics;
pub mod parse;
pub mod relay;
pub mod server;
pub mod signing;
pub mod store;
pub mod validator;

pub use config::RelayConfig;
pub use csr::CertificateSigningRequest;
pub use error::RelayError;
pub use relay::{Outcome, Relay};
pub use server::{AppState, router, run};
pub use signing::{CertificateSigner, RetryPolicy, SignError, WebhookSigner};
pub use validator::{Validator, ValidatorSet};
