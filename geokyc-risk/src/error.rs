//! Error types for geokyc-risk
//!
//! Analyzer-level failures never appear here: they are absorbed into
//! [`crate::types::EvidenceStatus`]. Only caller-visible failures do.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Caller-facing engine error
#[derive(Debug, Error)]
pub enum RiskError {
    /// Malformed subject (empty identifier, malformed geocode)
    #[error("Invalid subject: {0}")]
    InvalidSubject(String),

    /// Weights/thresholds/limits invalid (fatal at startup)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Batch larger than the configured maximum; nothing was processed
    #[error("Batch of {requested} subjects exceeds the maximum of {max}")]
    BatchAdmissionRejected { requested: usize, max: usize },

    /// Caller cancelled the request before an assessment was produced
    #[error("Request cancelled")]
    Cancelled,
}

impl From<geokyc_common::Error> for RiskError {
    fn from(err: geokyc_common::Error) -> Self {
        RiskError::Configuration(err.to_string())
    }
}

/// Result type for engine operations
pub type RiskResult<T> = Result<T, RiskError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Engine error mapped to a status code
    #[error(transparent)]
    Risk(#[from] RiskError),

    /// Request body could not be decoded (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            ApiError::Risk(RiskError::InvalidSubject(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_SUBJECT")
            }
            ApiError::Risk(RiskError::BatchAdmissionRejected { .. }) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "BATCH_ADMISSION_REJECTED")
            }
            ApiError::Risk(RiskError::Configuration(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR")
            }
            ApiError::Risk(RiskError::Cancelled) => {
                (StatusCode::SERVICE_UNAVAILABLE, "CANCELLED")
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
