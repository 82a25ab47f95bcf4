//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDate;
use serde::Serialize;
use z_margin_core::MarginError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Query range with start after end.
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange {
        /// Requested start date.
        start: NaiveDate,
        /// Requested end date.
        end: NaiveDate,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::InvalidRange { start, end } => (
                StatusCode::BAD_REQUEST,
                "invalid_range",
                self.to_string(),
                Some(serde_json::json!({
                    "start_date": start,
                    "end_date": end
                })),
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<MarginError> for ApiError {
    fn from(err: MarginError) -> Self {
        match err {
            MarginError::InvalidRange { start, end } => Self::InvalidRange { start, end },
            MarginError::CustomerNotFound(id) => Self::NotFound(format!("customer not found: {id}")),
            MarginError::Configuration(msg) => Self::BadRequest(msg),
            err @ MarginError::RangeTooLarge { .. } => Self::BadRequest(err.to_string()),
            MarginError::InvalidId(e) => Self::BadRequest(e.to_string()),
            err @ (MarginError::MalformedRecord { .. }
            | MarginError::UnknownCustomerReference { .. }) => Self::BadRequest(err.to_string()),
            MarginError::Storage(msg) | MarginError::Serialization(msg) => Self::Internal(msg),
        }
    }
}
