use serde::Deserialize;

use super::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("error contacting signer: {0}")]
    Transport(#[from] TransportError),
    #[error("server responded with error: {message}")]
    Server {
        code: i64,
        message: String,
        status: String,
    },
    #[error("received unsuccessful response code from signer: {code}")]
    UnsuccessfulStatus { code: u16 },
    #[error("unable to encode request for signer: {0}")]
    Encode(String),
    #[error("unable to decode signer response: {0}")]
    Decode(String),
    #[error("signing cancelled")]
    Cancelled,
}

impl From<RemoteError> for SignError {
    fn from(error: RemoteError) -> Self {
        Self::Server {
            code: error.code,
            message: error.message,
            status: error.status,
        }
    }
}

/// The `error` member of a failed signer response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RemoteError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
}

/// Structured body a signer may attach to a failed call:
/// `{"error": {"code": 429, "message": "...", "status": "RESOURCE_EXHAUSTED"}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: RemoteError,
}

impl ErrorEnvelope {
    /// Extracts the remote error from a response body, if it has that shape.
    pub fn from_body(body: &[u8]) -> Option<RemoteError> {
        serde_json::from_slice::<Self>(body)
            .ok()
            .map(|envelope| envelope.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_envelope() {
        let body = br#"{"error":{"code":429,"message":"quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        let remote = ErrorEnvelope::from_body(body).unwrap();
        assert_eq!(remote.code, 429);
        assert_eq!(remote.message, "quota exceeded");
        assert_eq!(remote.status, "RESOURCE_EXHAUSTED");
    }

    #[test]
    fn parses_partial_envelope() {
        let remote = ErrorEnvelope::from_body(br#"{"error":{"message":"quota exceeded"}}"#).unwrap();
        assert_eq!(remote.message, "quota exceeded");
        assert_eq!(remote.code, 0);
    }

    #[test]
    fn rejects_other_shapes() {
        assert!(ErrorEnvelope::from_body(b"").is_none());
        assert!(ErrorEnvelope::from_body(b"internal error").is_none());
        assert!(ErrorEnvelope::from_body(br#"{}"#).is_none());
        assert!(ErrorEnvelope::from_body(br#"{"error":"flat string"}"#).is_none());
    }

    #[test]
    fn server_error_message_is_verbatim() {
        let err = SignError::from(RemoteError {
            message: "quota exceeded".into(),
            ..Default::default()
        });
        assert_eq!(err.to_string(), "server responded with error: quota exceeded");
    }

    #[test]
    fn unsuccessful_status_mentions_code() {
        let err = SignError::UnsuccessfulStatus { code: 403 };
        assert!(err.to_string().contains("403"));
    }
}
