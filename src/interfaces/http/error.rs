//! Error type for the HTTP boundary.

use crate::error::{ControllerError, GateError, LedgerError};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The `x-api-key` header is missing or wrong.
    #[error("Unauthorized request")]
    Unauthorized,

    /// A required request field was absent or empty.
    #[error("Missing {0}")]
    MissingField(&'static str),

    /// The request body is not the JSON the route expects.
    #[error("Invalid request body: {0}")]
    InvalidBody(JsonRejection),

    /// A profit report body failed to parse or validate.
    #[error("Invalid profit report: {0}")]
    InvalidReport(JsonRejection),

    #[error(transparent)]
    Gate(#[from] GateError),
}

impl ApiError {
    /// Returns the HTTP status code for this error.
    ///
    /// - Unauthorized: 403 Forbidden
    /// - Precondition, validation and payment rejections: 400 Bad Request
    /// - Balance source failures: 502 Bad Gateway
    /// - Spawn, signal and storage failures: 500 Internal Server Error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::FORBIDDEN,
            Self::MissingField(_) | Self::InvalidBody(_) | Self::InvalidReport(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Gate(GateError::Balance(_)) => StatusCode::BAD_GATEWAY,
            Self::Gate(GateError::Controller(e)) => match e {
                ControllerError::AlreadyActive(_)
                | ControllerError::NotActive(_)
                | ControllerError::PaymentNotVerified(_) => StatusCode::BAD_REQUEST,
                ControllerError::SpawnFailed(_) | ControllerError::SignalFailed(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Gate(GateError::Ledger(LedgerError::Validation(_))) => StatusCode::BAD_REQUEST,
            Self::Gate(GateError::Ledger(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::MissingField(_) => "missing_field",
            Self::InvalidBody(_) => "invalid_body",
            Self::InvalidReport(_) => "invalid_report",
            Self::Gate(GateError::Balance(e)) => e.code(),
            Self::Gate(GateError::Controller(e)) => e.code(),
            Self::Gate(GateError::Ledger(LedgerError::Validation(_))) => "invalid_report",
            Self::Gate(GateError::Ledger(_)) => "ledger_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Storage errors may carry file paths; keep them in the logs only.
        let detail = match &self {
            Self::Gate(GateError::Ledger(LedgerError::Csv(_) | LedgerError::Io(_))) => {
                tracing::error!(error = %self, "ledger failure");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        let mut body = json!({
            "success": false,
            "error": self.code(),
            "detail": detail,
        });
        if let Self::Gate(GateError::Controller(ControllerError::PaymentNotVerified(result))) = &self
        {
            body["verification"] = json!(result);
        }
        (status, Json(body)).into_response()
    }
}
