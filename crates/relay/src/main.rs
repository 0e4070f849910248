use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use csr_relay::{RelayConfig, RetryPolicy, run};
use reqwest::Url;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Args {
    #[clap(long, env = "RELAY_HOST", default_value = "127.0.0.1")]
    host: String,
    #[clap(long, env = "RELAY_PORT", default_value = "3000")]
    port: u16,
    /// Webhook that signs certificate requests.
    #[clap(long, env = "SIGNER_URL")]
    signer_url: Url,
    /// Base URL of the store that persists request status.
    #[clap(long, env = "STORE_URL")]
    store_url: Url,
    #[clap(long, env = "INITIAL_BACKOFF_MS", default_value = "500")]
    initial_backoff_ms: u64,
    /// Longest wait between two signer attempts.
    #[clap(long, env = "MAX_BACKOFF_MS", default_value = "30000")]
    max_backoff_ms: u64,
    #[clap(long, env = "MAX_ATTEMPTS", default_value = "5", value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,
    #[clap(long, env = "REQUEST_TIMEOUT_SECS", default_value = "30")]
    request_timeout_secs: u64,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = RelayConfig {
        signer_url: args.signer_url,
        store_url: args.store_url,
        request_timeout: Duration::from_secs(args.request_timeout_secs),
        retry: RetryPolicy::new(Duration::from_millis(args.initial_backoff_ms), args.max_attempts)
            .with_max_backoff(Duration::from_millis(args.max_backoff_ms)),
    };

    let shutdown = CancellationToken::new();
    let state = config.build(shutdown.clone()).context("building relay")?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
        }
        shutdown.cancel();
    });

    info!(signer = %config.signer_url, store = %config.store_url, "starting csr relay");
    run(args.host, args.port, state).await
}
