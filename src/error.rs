use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::handlers::ingest::MAX_BODY_SIZE;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// Request body exceeds the ingestion cap
    #[error("request body exceeds {} bytes", MAX_BODY_SIZE)]
    PayloadTooLarge,
    /// Body is neither a log object nor an array of log objects
    #[error("invalid JSON payload")]
    InvalidPayload,
    /// A required field is missing or blank
    #[error("missing required field: {field} (entry {index})")]
    Validation { field: &'static str, index: usize },
    /// Malformed or illogical query parameter
    #[error("invalid query parameter '{parameter}': {message}")]
    QueryParameter {
        parameter: &'static str,
        message: String,
    },
    /// Client exceeded its ingestion rate
    #[error("rate limit exceeded")]
    RateLimited,
    /// Column name outside the distinct-value allow-list
    #[error("invalid filter column: {0}")]
    InvalidColumn(String),
    /// Any engine-level storage failure
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::PayloadTooLarge => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::InvalidPayload => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::Validation { .. } => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::QueryParameter { .. } => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            // Server-side failures: log with detail, answer with a generic
            // message so internals never reach the client.
            Self::InvalidColumn(_) | Self::Storage(_) => {
                tracing::error!(error = %self, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type_name(&self),
            }
        }));

        (status, body).into_response()
    }
}

fn error_type_name(error: &AppError) -> &'static str {
    match error {
        AppError::PayloadTooLarge => "payload_too_large",
        AppError::InvalidPayload => "invalid_payload",
        AppError::Validation { .. } => "validation_error",
        AppError::QueryParameter { .. } => "query_parameter_error",
        AppError::RateLimited => "rate_limited",
        AppError::InvalidColumn(_) => "invalid_column",
        AppError::Storage(_) => "storage_error",
    }
}
