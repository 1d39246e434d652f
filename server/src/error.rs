//! Error types for the person server.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response}
};
use errors::{ConfigError, StorageError};
use serde::Serialize;
use thiserror::Error;

/// Result type alias for the server.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors that can occur while serving requests or starting the server.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Storage backend failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Requested resource does not exist.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// Malformed payload, path or query.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Server startup error.
    #[error("Server error: {0}")]
    Server(String)
}

impl ApiError {
    pub fn person_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            resource: "person",
            id: id.to_string()
        }
    }
}

/// Error response body for HTTP endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Storage(e @ StorageError::ConnectionError { .. }) => {
                tracing::error!(error = %e, "Database unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "DATABASE_UNAVAILABLE",
                    "The database is unavailable".to_string(),
                    None
                )
            }
            Self::Storage(e) => {
                tracing::error!(error = %e, "Storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    None
                )
            }
            Self::NotFound { .. } => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                self.to_string(),
                None
            ),
            Self::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                "The request could not be processed".to_string(),
                Some(msg.clone())
            ),
            Self::Configuration(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIGURATION_ERROR",
                e.to_string(),
                None
            ),
            Self::Server(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERVER_ERROR",
                msg.clone(),
                None
            )
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = ApiError::person_not_found(7);
        assert_eq!(err.to_string(), "person not found: 7");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::person_not_found(1).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::BadRequest("bad json".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        let unavailable = ApiError::Storage(StorageError::ConnectionError {
            backend: "postgres".to_string(),
            reason: "refused".to_string()
        });
        assert_eq!(
            unavailable.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_error_response_without_details() {
        let resp = ErrorResponse {
            error: "test error".to_string(),
            code: "TEST_ERROR".to_string(),
            details: None
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("details"));
    }
}
