use super::types::ErrorResponse;
use crate::latch::{LatchError, OracleError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::{error, warn};

impl LatchError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::MissingUsername => StatusCode::BAD_REQUEST,
            Self::Configuration(_) => StatusCode::PRECONDITION_FAILED,
            Self::Oracle(OracleError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Self::Oracle(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Inconsistency { .. } => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for LatchError {
    /// Storage failures are logged and surfaced as a bare `500`; every other
    /// error carries its message so operators can act on it.
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Self::Storage(err) => {
                error!("Storage error: {err:#}");
                "internal storage error".to_string()
            }
            Self::Inconsistency { .. } => {
                error!("{self}");
                self.to_string()
            }
            _ => {
                warn!("{self}");
                self.to_string()
            }
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}
