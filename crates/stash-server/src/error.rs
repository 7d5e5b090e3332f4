//! Error types for the server.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use stash_kv::KvError;
use thiserror::Error;

/// Server error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Bad request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Key-value store error.
    #[error(transparent)]
    Kv(#[from] KvError),

    /// Session cache error.
    #[error(transparent)]
    Session(#[from] stash_session::Error),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Byte limit, for `capacity_exceeded`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Conflicting setting, for `config_conflict`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorResponse {
    fn new(code: &str, message: String) -> Self {
        Self {
            code: code.to_string(),
            message,
            limit: None,
            field: None,
        }
    }
}

/// Status, code and extra fields for a store error.
pub fn kv_error_parts(err: &KvError) -> (StatusCode, ErrorResponse) {
    let message = err.to_string();
    match err {
        KvError::NotFound { .. } => (StatusCode::NOT_FOUND, ErrorResponse::new("not_found", message)),
        KvError::KeyExists { .. } => (
            StatusCode::CONFLICT,
            ErrorResponse::new("key_exists", message),
        ),
        KvError::BucketNotFound(_) => (
            StatusCode::NOT_FOUND,
            ErrorResponse::new("bucket_not_found", message),
        ),
        KvError::CapacityExceeded { limit, .. } => (
            StatusCode::PAYLOAD_TOO_LARGE,
            ErrorResponse {
                limit: Some(*limit),
                ..ErrorResponse::new("capacity_exceeded", message)
            },
        ),
        KvError::ConfigConflict { field, .. } => (
            StatusCode::CONFLICT,
            ErrorResponse {
                field: Some(field.clone()),
                ..ErrorResponse::new("config_conflict", message)
            },
        ),
        KvError::InvalidConfig(_) => (
            StatusCode::BAD_REQUEST,
            ErrorResponse::new("invalid_config", message),
        ),
        KvError::InvalidKey(_) => (
            StatusCode::BAD_REQUEST,
            ErrorResponse::new("invalid_key", message),
        ),
        KvError::InvalidBucketName(_) => (
            StatusCode::BAD_REQUEST,
            ErrorResponse::new("invalid_bucket_name", message),
        ),
        KvError::WatchLagged { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new("watch_lagged", message),
        ),
        KvError::Compression(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new("internal_error", message),
        ),
        KvError::Unavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorResponse::new("unavailable", message),
        ),
    }
}

impl ServerError {
    fn parts(&self) -> (StatusCode, ErrorResponse) {
        let message = self.to_string();
        match self {
            ServerError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::new("bad_request", message))
            }
            ServerError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("internal_error", message),
            ),
            ServerError::Kv(err) => kv_error_parts(err),
            ServerError::Session(err) => match err {
                stash_session::Error::CapacityExceeded { source, .. } => {
                    let (status, mut body) = kv_error_parts(source);
                    body.message = message;
                    (status, body)
                }
                stash_session::Error::StoreUnavailable { .. } => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorResponse::new("unavailable", message),
                ),
                stash_session::Error::SessionLoad(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("session_load", message),
                ),
                stash_session::Error::SessionPersist(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("session_persist", message),
                ),
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = self.parts();

        if status.is_server_error() {
            tracing::error!(status = %status, code = %body.code, error = ?self, "Server error");
        } else {
            tracing::warn!(status = %status, code = %body.code, error = %body.message, "Client error");
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_error_mapping() {
        let cases = [
            (KvError::NotFound { key: "k".into() }, 404, "not_found"),
            (KvError::BucketNotFound("b".into()), 404, "bucket_not_found"),
            (KvError::KeyExists { key: "k".into() }, 409, "key_exists"),
            (KvError::InvalidKey("a b".into()), 400, "invalid_key"),
            (KvError::InvalidBucketName("a b".into()), 400, "invalid_bucket_name"),
            (KvError::InvalidConfig("zero".into()), 400, "invalid_config"),
            (KvError::Unavailable("down".into()), 503, "unavailable"),
        ];
        for (err, status, code) in cases {
            let (got_status, body) = kv_error_parts(&err);
            assert_eq!(got_status.as_u16(), status, "{code}");
            assert_eq!(body.code, code);
            assert!(body.limit.is_none() && body.field.is_none());
        }
    }

    #[test]
    fn test_capacity_carries_limit() {
        let (status, body) = kv_error_parts(&KvError::CapacityExceeded {
            bucket: "todos".into(),
            limit: 1024,
        });
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body.limit, Some(1024));
    }

    #[test]
    fn test_conflict_carries_field() {
        let (status, body) = kv_error_parts(&KvError::ConfigConflict {
            bucket: "todos".into(),
            field: "ttl".into(),
        });
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.field.as_deref(), Some("ttl"));

        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("limit").is_none());
    }

    #[test]
    fn test_session_store_failure_is_unavailable() {
        let err = ServerError::from(stash_session::Error::StoreUnavailable {
            operation: "get",
            source: KvError::Unavailable("down".into()),
        });
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
