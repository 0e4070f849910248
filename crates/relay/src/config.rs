use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Url;
use tokio_util::sync::CancellationToken;

use crate::metrics::{CounterMetrics, TracingEvents};
use crate::relay::Relay;
use crate::server::AppState;
use crate::signing::{HttpTransport, RetryPolicy, WebhookSigner};
use crate::store::HttpStore;
use crate::validator::ValidatorSet;

/// Everything needed to assemble the process-wide relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub signer_url: Url,
    pub store_url: Url,
    /// Applied to each outbound call, not to the whole retry loop.
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl RelayConfig {
    /// Builds the shared relay and server state. Called once at startup.
    pub fn build(&self, shutdown: CancellationToken) -> Result<AppState> {
        let metrics = Arc::new(CounterMetrics::new());
        let transport = HttpTransport::new(self.signer_url.clone(), self.request_timeout)?;
        let signer = WebhookSigner::new(Arc::new(transport), metrics.clone()).with_policy(self.retry);
        let store = HttpStore::new(self.store_url.clone(), self.request_timeout)?;

        let relay = Relay::new(
            Arc::new(signer),
            Arc::new(store),
            ValidatorSet::builtin(),
            metrics.clone(),
            Arc::new(TracingEvents),
        );

        Ok(AppState {
            relay: Arc::new(relay),
            metrics,
            shutdown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_state_with_builtin_validators() {
        let config = RelayConfig {
            signer_url: Url::parse("http://signer.local/sign").unwrap(),
            store_url: Url::parse("http://store.local/").unwrap(),
            request_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        };

        let state = config.build(CancellationToken::new()).unwrap();
        assert_eq!(state.relay.validators().validators().len(), 3);
        assert_eq!(state.metrics.total_signing_outcomes(), 0);
    }
}
