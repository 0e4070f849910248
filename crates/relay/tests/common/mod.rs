#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{post, put},
};
use csr_relay::csr::CsrCondition;
use csr_relay::metrics::{CounterMetrics, TracingEvents};
use csr_relay::signing::{HttpTransport, RetryPolicy, WebhookSigner};
use csr_relay::store::HttpStore;
use csr_relay::{CertificateSigningRequest, Relay, ValidatorSet};
use reqwest::Url;

/// What the stub signer answers to one call.
#[derive(Debug, Clone)]
pub enum SignerReply {
    /// 200 with the posted request carrying this certificate.
    Issue(&'static str),
    Status(u16, &'static str),
}

#[derive(Default)]
pub struct StubSigner {
    replies: Mutex<VecDeque<SignerReply>>,
    hits: AtomicUsize,
}

impl StubSigner {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn sign_handler(State(stub): State<Arc<StubSigner>>, body: Bytes) -> Response {
    stub.hits.fetch_add(1, Ordering::SeqCst);
    let reply = {
        let mut replies = stub.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        }
    };
    match reply {
        Some(SignerReply::Issue(certificate)) => {
            let csr: CertificateSigningRequest = serde_json::from_slice(&body).unwrap();
            Json(csr.with_certificate(certificate.as_bytes().to_vec())).into_response()
        }
        Some(SignerReply::Status(code, body)) => {
            (StatusCode::from_u16(code).unwrap(), body.to_string()).into_response()
        }
        None => StatusCode::NOT_IMPLEMENTED.into_response(),
    }
}

/// Serves `POST /sign` from a script; the last reply repeats.
pub async fn spawn_signer(replies: Vec<SignerReply>) -> (Url, Arc<StubSigner>) {
    let stub = Arc::new(StubSigner {
        replies: Mutex::new(replies.into()),
        hits: AtomicUsize::new(0),
    });
    let router = Router::new()
        .route("/sign", post(sign_handler))
        .with_state(stub.clone());
    let addr = serve(router).await;
    (Url::parse(&format!("http://{addr}/sign")).unwrap(), stub)
}

#[derive(Default)]
pub struct StubStore {
    pub fail_with: Option<u16>,
    pub updates: Mutex<Vec<(String, CertificateSigningRequest)>>,
}

async fn update_status_handler(
    State(stub): State<Arc<StubStore>>,
    Path(name): Path<String>,
    Json(csr): Json<CertificateSigningRequest>,
) -> Response {
    if let Some(code) = stub.fail_with {
        return (StatusCode::from_u16(code).unwrap(), "the object has been modified").into_response();
    }
    stub.updates.lock().unwrap().push((name, csr.clone()));
    let mut stored = csr;
    stored.metadata.resource_version = "2".to_string().into();
    Json(stored).into_response()
}

/// Serves `PUT /csrs/{name}/status`.
pub async fn spawn_store(fail_with: Option<u16>) -> (Url, Arc<StubStore>) {
    let stub = Arc::new(StubStore {
        fail_with,
        ..Default::default()
    });
    let router = Router::new()
        .route("/csrs/{name}/status", put(update_status_handler))
        .with_state(stub.clone());
    let addr = serve(router).await;
    (Url::parse(&format!("http://{addr}/")).unwrap(), stub)
}

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_url() -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}/sign")).unwrap()
}

pub fn fast_retries(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(Duration::from_millis(5), max_attempts)
}

pub fn relay(signer_url: Url, store_url: Url, retry: RetryPolicy) -> (Arc<Relay>, Arc<CounterMetrics>) {
    let metrics = Arc::new(CounterMetrics::new());
    let transport = HttpTransport::new(signer_url, Duration::from_secs(5)).unwrap();
    let signer = WebhookSigner::new(Arc::new(transport), metrics.clone()).with_policy(retry);
    let store = HttpStore::new(store_url, Duration::from_secs(5)).unwrap();
    let relay = Relay::new(
        Arc::new(signer),
        Arc::new(store),
        ValidatorSet::builtin(),
        metrics.clone(),
        Arc::new(TracingEvents),
    );
    (Arc::new(relay), metrics)
}

/// PEM request with subject `CN=system:node:{node}, O=system:nodes`.
pub fn node_request_pem(node: &str, sans: Vec<String>) -> Vec<u8> {
    let key = rcgen::KeyPair::generate().unwrap();
    let mut params = rcgen::CertificateParams::new(sans).unwrap();
    params.distinguished_name = rcgen::DistinguishedName::new();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, format!("system:node:{node}"));
    params
        .distinguished_name
        .push(rcgen::DnType::OrganizationName, "system:nodes");
    params.serialize_request(&key).unwrap().pem().unwrap().into_bytes()
}

pub fn approved_csr(name: &str, request: Vec<u8>) -> CertificateSigningRequest {
    let mut csr = CertificateSigningRequest::default();
    csr.metadata.name = name.to_string().into();
    csr.metadata.uid = format!("{name}-uid").into();
    csr.metadata.resource_version = "1".to_string().into();
    csr.spec.request = request.into();
    csr.spec.signer_name = "kubernetes.io/kube-apiserver-client-kubelet".to_string().into();
    csr.status.conditions = vec![CsrCondition {
        kind: "Approved".to_string(),
        status: "True".to_string().into(),
        reason: "AutoApproved".to_string().into(),
        ..Default::default()
    }]
    .into();
    csr
}

/// An approved node client renewal for `node`.
pub fn renewal_csr(name: &str, node: &str) -> CertificateSigningRequest {
    let mut csr = approved_csr(name, node_request_pem(node, Vec::new()));
    csr.spec.username = format!("system:node:{node}").into();
    csr.spec.groups = vec!["system:nodes".to_string(), "system:authenticated".to_string()].into();
    csr.spec.usages = vec![
        "digital signature".to_string(),
        "key encipherment".to_string(),
        "client auth".to_string(),
    ]
    .into();
    csr
}
