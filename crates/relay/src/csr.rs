use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub const CONDITION_APPROVED: &str = "Approved";
pub const CONDITION_DENIED: &str = "Denied";

pub const USAGE_DIGITAL_SIGNATURE: &str = "digital signature";
pub const USAGE_KEY_ENCIPHERMENT: &str = "key encipherment";
pub const USAGE_CLIENT_AUTH: &str = "client auth";
pub const USAGE_SERVER_AUTH: &str = "server auth";

/// A certificate signing request in the `certificates.k8s.io` JSON shape.
///
/// Fields the relay does not interpret are kept in the flattened `unknown`
/// maps and modelled fields remember whether they were absent, `null` or set,
/// so a request survives a round trip through the relay unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSigningRequest {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: CsrSpec,
    #[serde(default)]
    pub status: CsrStatus,
    #[serde(flatten)]
    pub unknown: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub name: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub uid: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub resource_version: Field<String>,
    #[serde(flatten)]
    pub unknown: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrSpec {
    /// PEM-encoded PKCS#10 request, base64 on the wire.
    #[serde(default, skip_serializing_if = "Field::is_absent", with = "base64_field")]
    pub request: Field<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub signer_name: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub username: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub groups: Field<Vec<String>>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub usages: Field<Vec<String>>,
    #[serde(flatten)]
    pub unknown: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrStatus {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub conditions: Field<Vec<CsrCondition>>,
    /// Issued certificate chain (PEM), base64 on the wire.
    #[serde(default, skip_serializing_if = "Field::is_absent", with = "base64_field")]
    pub certificate: Field<Vec<u8>>,
    #[serde(flatten)]
    pub unknown: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrCondition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub status: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub reason: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub message: Field<String>,
    #[serde(flatten)]
    pub unknown: BTreeMap<String, Value>,
}

impl CsrCondition {
    fn is_true(&self) -> bool {
        // Older API versions leave status unset on approval conditions.
        self.status.as_deref().is_none_or(|s| s == "True")
    }
}

/// A modelled JSON member that keeps its presence: missing, `null`, or set.
///
/// Pair with `#[serde(default, skip_serializing_if = "Field::is_absent")]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    Absent,
    Null,
    Value(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Absent
    }
}

impl<T> Field<T> {
    pub fn get(&self) -> Option<&T> {
        match self {
            Field::Value(value) => Some(value),
            Field::Absent | Field::Null => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }
}

impl Field<String> {
    pub fn as_deref(&self) -> Option<&str> {
        self.get().map(String::as_str)
    }
}

impl<T> Field<Vec<T>> {
    /// The list, or an empty slice when unset.
    pub fn as_slice(&self) -> &[T] {
        self.get().map(Vec::as_slice).unwrap_or_default()
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Field::Value(value)
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Value(value) => value.serialize(serializer),
            Field::Absent | Field::Null => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Option::<T>::deserialize(deserializer)?.map_or(Field::Null, Field::Value))
    }
}

/// Reference to a request used when emitting events against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectRef {
    pub kind: &'static str,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl CertificateSigningRequest {
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// True when an `Approved` condition is present and no `Denied` condition is.
    pub fn is_approved(&self) -> bool {
        let mut approved = false;
        for condition in self.status.conditions.as_slice().iter().filter(|c| c.is_true()) {
            match condition.kind.as_str() {
                CONDITION_DENIED => return false,
                CONDITION_APPROVED => approved = true,
                _ => {}
            }
        }
        approved
    }

    /// The issued certificate, if one has been written and is non-empty.
    pub fn certificate(&self) -> Option<&[u8]> {
        self.status
            .certificate
            .get()
            .map(Vec::as_slice)
            .filter(|cert| !cert.is_empty())
    }

    /// Returns a copy of this request that differs only in `status.certificate`.
    pub fn with_certificate(&self, certificate: Vec<u8>) -> Self {
        let mut issued = self.clone();
        issued.status.certificate = Field::Value(certificate);
        issued
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            kind: "CertificateSigningRequest",
            name: self.name().to_string(),
            uid: self.metadata.uid.get().cloned(),
        }
    }
}

mod base64_field {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    use super::Field;

    pub fn serialize<S: Serializer>(bytes: &Field<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Field::Value(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            Field::Absent | Field::Null => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Field<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD
                .decode(encoded.as_bytes())
                .map(Field::Value)
                .map_err(D::Error::custom),
            None => Ok(Field::Null),
        }
    }
}
