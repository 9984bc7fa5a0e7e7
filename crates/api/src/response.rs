//! Standardized API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Success response for ingestion.
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub success: bool,
    pub stream: String,
    pub accepted: u64,
    pub chunks_created: u64,
    pub timestamp: i64,
}

impl IngestResponse {
    pub fn success(stream: impl Into<String>, accepted: u64, chunks_created: u64) -> Self {
        Self {
            success: true,
            stream: stream.into(),
            accepted,
            chunks_created,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Liveness check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct LiveResponse {
    pub status: String,
    pub uptime_secs: i64,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = Some(details);
        self
    }
}

/// API error carrying an engine error code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
}

impl ApiError {
    pub fn with_code(status: StatusCode, code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse::new(msg, code),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::BAD_REQUEST, "VALID_001", msg)
    }

    pub fn payload_too_large(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::PAYLOAD_TOO_LARGE, "VALID_001", msg)
    }

    pub fn validation(errors: Vec<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            response: ErrorResponse::new("Validation failed", "VALID_001").with_details(errors),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<engine_core::Error> for ApiError {
    fn from(err: engine_core::Error) -> Self {
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        ApiError::with_code(status, err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_maps_code_and_status() {
        let err: ApiError = engine_core::Error::stream_not_found("cpu").into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.response.code, "CONFIG_002");

        let err: ApiError = engine_core::Error::configuration("bad").into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.response.code, "CONFIG_001");
    }
}
