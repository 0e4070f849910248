use axum::Json;
use axum::http::StatusCode;
use axum_core::response::{IntoResponse as AxumCoreIntoResponse, Response};
use serde_json::json;

use crate::parse::ParseError;
use crate::signing::SignError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("unable to parse csr {name:?}: {source}")]
    Parse {
        name: String,
        #[source]
        source: ParseError,
    },
    #[error("error auto signing csr {name:?}: {source}")]
    Sign {
        name: String,
        #[source]
        source: SignError,
    },
    #[error("error updating signature for csr {name:?}: {source}")]
    Persist {
        name: String,
        #[source]
        source: StoreError,
    },
}

impl RelayError {
    /// Name of the request the failure belongs to.
    pub fn name(&self) -> &str {
        match self {
            Self::Parse { name, .. } | Self::Sign { name, .. } | Self::Persist { name, .. } => {
                name
            }
        }
    }
}

/// Trait implementation to convert this error into an axum http response
impl AxumCoreIntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match self {
            RelayError::Parse { .. } => StatusCode::BAD_REQUEST,
            RelayError::Sign {
                source: SignError::Cancelled,
                ..
            } => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::Sign { .. } | RelayError::Persist { .. } => StatusCode::BAD_GATEWAY,
        };
        let body = Json(json!({
            "name": self.name(),
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}
