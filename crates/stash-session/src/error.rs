//! Error types for session operations.

use stash_kv::KvError;

use crate::cookie::CookieError;

/// Error type for session operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The cookie-backed session could not be read.
    #[error("failed to load session cookie")]
    SessionLoad(#[source] CookieError),

    /// The cookie-backed session could not be written to the response.
    #[error("failed to persist session cookie")]
    SessionPersist(#[source] CookieError),

    /// The key-value store failed for a reason other than a missing key.
    #[error("store unavailable during {operation}")]
    StoreUnavailable {
        operation: &'static str,
        #[source]
        source: KvError,
    },

    /// The key-value store refused the write because the bucket is full.
    #[error("store full during {operation}")]
    CapacityExceeded {
        operation: &'static str,
        #[source]
        source: KvError,
    },
}

impl Error {
    /// Wrap a store error with the operation that hit it.
    pub(crate) fn store(operation: &'static str, source: KvError) -> Self {
        if source.is_capacity_exceeded() {
            Error::CapacityExceeded { operation, source }
        } else {
            Error::StoreUnavailable { operation, source }
        }
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;
