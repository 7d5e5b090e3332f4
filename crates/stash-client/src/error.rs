//! Client error types.

use serde::{Deserialize, Serialize};
use stash_kv::KvError;
use thiserror::Error;

/// Client error type.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A value could not be base64-decoded.
    #[error("Invalid value encoding: {0}")]
    Decode(#[from] base64::DecodeError),

    /// Server returned an error response.
    #[error("API error ({status}): {}", .body.message)]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error body from the server.
        body: ErrorResponse,
    },

    /// The server ended a watch with an error event.
    #[error("Watch failed: {}", .0.message)]
    WatchFailed(ErrorResponse),

    /// The server sent a response the client does not understand.
    #[error("Unexpected response: {0}")]
    Protocol(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stream error.
    #[error("Stream error: {0}")]
    Stream(String),
}

impl Error {
    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Api { status: 404, .. })
    }

    /// Check if this is a server error.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Api { status, .. } if *status >= 500)
    }

    /// The server's error body, if the failure came from the server.
    pub fn response(&self) -> Option<&ErrorResponse> {
        match self {
            Error::Api { body, .. } | Error::WatchFailed(body) => Some(body),
            _ => None,
        }
    }

    /// Convert to the store error the server reported, so remote buckets
    /// fail the same way local ones do.
    ///
    /// Transport failures become [`KvError::Unavailable`].
    pub fn into_kv_error(self, bucket: &str, key: &str) -> KvError {
        let Some(body) = self.response() else {
            return KvError::Unavailable(self.to_string());
        };
        match body.code.as_str() {
            "not_found" => KvError::NotFound {
                key: key.to_string(),
            },
            "key_exists" => KvError::KeyExists {
                key: key.to_string(),
            },
            "bucket_not_found" => KvError::BucketNotFound(bucket.to_string()),
            "capacity_exceeded" => KvError::CapacityExceeded {
                bucket: bucket.to_string(),
                limit: body.limit.unwrap_or_default(),
            },
            "config_conflict" => KvError::ConfigConflict {
                bucket: bucket.to_string(),
                field: body.field.clone().unwrap_or_default(),
            },
            "invalid_key" => KvError::InvalidKey(key.to_string()),
            "invalid_bucket_name" => KvError::InvalidBucketName(bucket.to_string()),
            "invalid_config" => KvError::InvalidConfig(body.message.clone()),
            "watch_lagged" => KvError::WatchLagged {
                key: key.to_string(),
                skipped: 0,
            },
            _ => KvError::Unavailable(body.message.clone()),
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error response from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}
