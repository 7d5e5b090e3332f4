//! Error types for key-value bucket operations.

/// Error type for key-value bucket operations.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// Key was never written, was deleted, or has expired.
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// A create found a live value already stored under the key.
    #[error("key already exists: {key}")]
    KeyExists { key: String },

    /// No bucket with this name exists.
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    /// The write would push the bucket past its byte limit.
    #[error("bucket '{bucket}' would exceed its {limit} byte limit")]
    CapacityExceeded { bucket: String, limit: u64 },

    /// An existing bucket was re-created with an incompatible setting.
    #[error("bucket '{bucket}' already exists with a different {field}")]
    ConfigConflict { bucket: String, field: String },

    /// The bucket configuration is unusable.
    #[error("invalid bucket configuration: {0}")]
    InvalidConfig(String),

    /// The key contains characters the bucket does not accept.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// The bucket name contains characters the registry does not accept.
    #[error("invalid bucket name: {0:?}")]
    InvalidBucketName(String),

    /// Compressing or decompressing a stored value failed.
    #[error("compression error: {0}")]
    Compression(#[from] std::io::Error),

    /// The watcher fell behind and missed updates; it must resubscribe.
    #[error("watch on '{key}' fell behind by {skipped} updates")]
    WatchLagged { key: String, skipped: u64 },

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl KvError {
    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::NotFound { .. })
    }

    /// Check if this is a key-exists error.
    pub fn is_key_exists(&self) -> bool {
        matches!(self, KvError::KeyExists { .. })
    }

    /// Check if this is a capacity error.
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, KvError::CapacityExceeded { .. })
    }
}

/// Result type for key-value bucket operations.
pub type Result<T> = std::result::Result<T, KvError>;
