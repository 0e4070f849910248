//! Outcome signals emitted by the relay.
//!
//! The relay only calls into these traits; aggregation and event storage live
//! outside of it. `CounterMetrics` and `TracingEvents` are the in-process
//! implementations used by the binary.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{info, warn};

use crate::csr::ObjectRef;

/// Outbound call name for the signer webhook.
pub const SIGN_CALL: &str = "signer.webhook.Sign";
/// Outbound call name for the store status update.
pub const UPDATE_STATUS_CALL: &str = "store.CertificateSigningRequests.updateStatus";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundStatus {
    Ok,
    Error,
}

impl OutboundStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningStatus {
    ParseError,
    SignError,
    UpdateError,
    Signed,
}

impl SigningStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParseError => "parse_error",
            Self::SignError => "sign_error",
            Self::UpdateError => "update_error",
            Self::Signed => "signed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventType {
    Normal,
    Warning,
}

/// Fire-and-forget recorder for outbound calls and signing outcomes.
pub trait MetricsRecorder: Send + Sync {
    fn outbound_call(&self, call: &str, status: OutboundStatus);

    /// `label` is the classification label of the request.
    fn signing_outcome(&self, label: &str, status: SigningStatus);
}

/// Emits user-visible events against a request.
pub trait EventRecorder: Send + Sync {
    fn event(&self, object: &ObjectRef, kind: EventType, reason: &str, message: &str);
}

type Counters = BTreeMap<String, BTreeMap<&'static str, u64>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub outbound_calls: Counters,
    pub signing_outcomes: Counters,
}

/// In-process counters keyed by call name (or label) and status.
#[derive(Debug, Default)]
pub struct CounterMetrics {
    inner: Mutex<MetricsSnapshot>,
}

impl CounterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.lock().clone()
    }

    pub fn outbound_count(&self, call: &str, status: OutboundStatus) -> u64 {
        count(&self.lock().outbound_calls, call, status.as_str())
    }

    pub fn signing_count(&self, label: &str, status: SigningStatus) -> u64 {
        count(&self.lock().signing_outcomes, label, status.as_str())
    }

    /// Total outcomes recorded across every label and status.
    pub fn total_signing_outcomes(&self) -> u64 {
        self.lock()
            .signing_outcomes
            .values()
            .flat_map(BTreeMap::values)
            .sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MetricsSnapshot> {
        // Counters stay usable even if a recording thread panicked.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn count(counters: &Counters, key: &str, status: &str) -> u64 {
    counters
        .get(key)
        .and_then(|by_status| by_status.get(status))
        .copied()
        .unwrap_or(0)
}

impl MetricsRecorder for CounterMetrics {
    fn outbound_call(&self, call: &str, status: OutboundStatus) {
        *self
            .lock()
            .outbound_calls
            .entry(call.to_string())
            .or_default()
            .entry(status.as_str())
            .or_default() += 1;
    }

    fn signing_outcome(&self, label: &str, status: SigningStatus) {
        *self
            .lock()
            .signing_outcomes
            .entry(label.to_string())
            .or_default()
            .entry(status.as_str())
            .or_default() += 1;
    }
}

/// Writes events to the log instead of an event sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEvents;

impl EventRecorder for TracingEvents {
    fn event(&self, object: &ObjectRef, kind: EventType, reason: &str, message: &str) {
        match kind {
            EventType::Normal => {
                info!(kind = object.kind, name = %object.name, reason, detail = message, "event")
            }
            EventType::Warning => {
                warn!(kind = object.kind, name = %object.name, reason, detail = message, "event")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_call_and_status() {
        let metrics = CounterMetrics::new();
        metrics.outbound_call(SIGN_CALL, OutboundStatus::Error);
        metrics.outbound_call(SIGN_CALL, OutboundStatus::Error);
        metrics.outbound_call(SIGN_CALL, OutboundStatus::Ok);

        assert_eq!(metrics.outbound_count(SIGN_CALL, OutboundStatus::Error), 2);
        assert_eq!(metrics.outbound_count(SIGN_CALL, OutboundStatus::Ok), 1);
        assert_eq!(metrics.outbound_count(UPDATE_STATUS_CALL, OutboundStatus::Ok), 0);
    }

    #[test]
    fn totals_signing_outcomes() {
        let metrics = CounterMetrics::new();
        metrics.signing_outcome("none", SigningStatus::ParseError);
        metrics.signing_outcome("kubelet_serving", SigningStatus::Signed);

        assert_eq!(metrics.total_signing_outcomes(), 2);
        assert_eq!(metrics.signing_count("kubelet_serving", SigningStatus::Signed), 1);
    }

    #[test]
    fn snapshot_serializes_nested() {
        let metrics = CounterMetrics::new();
        metrics.signing_outcome("none", SigningStatus::Signed);

        let value = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(value["signing_outcomes"]["none"]["signed"], 1);
        assert!(value["outbound_calls"].as_object().unwrap().is_empty());
    }
}
