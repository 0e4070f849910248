use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::csr::CertificateSigningRequest;
use crate::error::RelayError;
use crate::metrics::{CounterMetrics, MetricsSnapshot};
use crate::relay::{Outcome, Relay};

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub metrics: Arc<CounterMetrics>,
    /// Parent of every invocation's cancellation token.
    pub shutdown: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(|| async move { (StatusCode::OK, "Ok").into_response() }))
        .route("/metrics", get(metrics_handler))
        .route("/csr", post(csr_handler))
        .with_state(state)
}

pub async fn run(host: String, port: u16, state: AppState) -> Result<()> {
    let shutdown = state.shutdown.clone();
    let router = router(state);

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("binding {host}:{port}"))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("serving http")?;

    Ok(())
}

async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

async fn csr_handler(
    State(state): State<AppState>,
    Json(csr): Json<CertificateSigningRequest>,
) -> Result<Json<Outcome>, RelayError> {
    let cancel = state.shutdown.child_token();
    match state.relay.handle(&csr, &cancel).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(err) => {
            warn!(csr = err.name(), error = %err, "csr not signed");
            Err(err)
        }
    }
}
