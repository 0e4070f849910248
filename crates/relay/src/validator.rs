use std::collections::BTreeSet;

use crate::csr::{
    CertificateSigningRequest, USAGE_CLIENT_AUTH, USAGE_DIGITAL_SIGNATURE,
    USAGE_KEY_ENCIPHERMENT, USAGE_SERVER_AUTH,
};
use crate::parse::ParsedRequest;

/// Label reported when no validator recognizes a request.
pub const AUTH_FLOW_LABEL_NONE: &str = "none";

pub const NODES_GROUP: &str = "system:nodes";
pub const BOOTSTRAPPERS_GROUP: &str = "system:bootstrappers";
const NODE_USER_PREFIX: &str = "system:node:";

pub type Recognizer = fn(&CertificateSigningRequest, &ParsedRequest) -> bool;

/// A classification rule. Recognizers never fail: anything they cannot
/// decide is simply not a match.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    pub name: &'static str,
    pub label: &'static str,
    pub recognize: Recognizer,
}

/// Ordered rule list; the first validator that recognizes a request wins.
#[derive(Debug, Clone)]
pub struct ValidatorSet {
    validators: Vec<Validator>,
}

impl ValidatorSet {
    pub fn new(validators: Vec<Validator>) -> Self {
        Self { validators }
    }

    /// Node client bootstrap, node client renewal and node serving flows.
    pub fn builtin() -> Self {
        Self::new(vec![
            Validator {
                name: "node-client-bootstrap",
                label: "kubelet_bootstrap",
                recognize: is_node_client_bootstrap,
            },
            Validator {
                name: "node-client-renewal",
                label: "kubelet_self_renewal",
                recognize: is_node_client_renewal,
            },
            Validator {
                name: "node-serving",
                label: "kubelet_serving",
                recognize: is_node_serving,
            },
        ])
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    pub fn classify(&self, csr: &CertificateSigningRequest, parsed: &ParsedRequest) -> &'static str {
        self.validators
            .iter()
            .find(|v| (v.recognize)(csr, parsed))
            .map_or(AUTH_FLOW_LABEL_NONE, |v| v.label)
    }
}

impl Default for ValidatorSet {
    fn default() -> Self {
        Self::builtin()
    }
}

fn usages_match(csr: &CertificateSigningRequest, allowed: &[&[&str]]) -> bool {
    let requested: BTreeSet<&str> = csr
        .spec
        .usages
        .as_slice()
        .iter()
        .map(String::as_str)
        .collect();
    allowed
        .iter()
        .any(|set| requested == set.iter().copied().collect::<BTreeSet<_>>())
}

fn has_node_subject(parsed: &ParsedRequest) -> bool {
    parsed.organizations == [NODES_GROUP]
        && parsed
            .common_name
            .as_deref()
            .and_then(|cn| cn.strip_prefix(NODE_USER_PREFIX))
            .is_some_and(|node| !node.is_empty())
}

fn requested_by_subject(csr: &CertificateSigningRequest, parsed: &ParsedRequest) -> bool {
    csr.spec
        .username
        .as_deref()
        .is_some_and(|user| parsed.common_name.as_deref() == Some(user))
}

fn is_node_client(csr: &CertificateSigningRequest, parsed: &ParsedRequest) -> bool {
    has_node_subject(parsed)
        && !parsed.has_sans()
        && usages_match(
            csr,
            &[
                &[USAGE_DIGITAL_SIGNATURE, USAGE_KEY_ENCIPHERMENT, USAGE_CLIENT_AUTH],
                &[USAGE_DIGITAL_SIGNATURE, USAGE_CLIENT_AUTH],
            ],
        )
}

fn is_node_client_bootstrap(csr: &CertificateSigningRequest, parsed: &ParsedRequest) -> bool {
    is_node_client(csr, parsed)
        && csr
            .spec
            .groups
            .as_slice()
            .iter()
            .any(|g| g == BOOTSTRAPPERS_GROUP)
}

fn is_node_client_renewal(csr: &CertificateSigningRequest, parsed: &ParsedRequest) -> bool {
    is_node_client(csr, parsed) && requested_by_subject(csr, parsed)
}

fn is_node_serving(csr: &CertificateSigningRequest, parsed: &ParsedRequest) -> bool {
    has_node_subject(parsed)
        && requested_by_subject(csr, parsed)
        && (!parsed.dns_names.is_empty() || !parsed.ip_addresses.is_empty())
        && parsed.email_addresses.is_empty()
        && usages_match(
            csr,
            &[
                &[USAGE_DIGITAL_SIGNATURE, USAGE_KEY_ENCIPHERMENT, USAGE_SERVER_AUTH],
                &[USAGE_DIGITAL_SIGNATURE, USAGE_SERVER_AUTH],
            ],
        )
}
