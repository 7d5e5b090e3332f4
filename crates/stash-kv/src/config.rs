//! Configuration for a key-value bucket.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KvError, Result};

/// Default bucket name for session MVC snapshots.
pub const DEFAULT_BUCKET: &str = "todos";

/// Default bucket description.
pub const DEFAULT_DESCRIPTION: &str = "Datastar Todos";

/// Default time-to-live for values (1 hour).
pub const DEFAULT_TTL: Option<Duration> = Some(Duration::from_secs(3600));

/// Default maximum total bucket size (16 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 16 * 1024 * 1024;

/// Configuration for a bucket.
///
/// Everything except the description is fixed once the bucket exists;
/// see [`BucketConfig::conflicting_field`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Bucket name.
    pub name: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// Whether values are stored zstd-compressed.
    #[serde(default)]
    pub compression: bool,

    /// Time after the last write before a value expires.
    /// `None` means values never expire.
    #[serde(default)]
    pub ttl: Option<Duration>,

    /// Maximum total bytes held by the bucket (keys plus stored values).
    pub max_bytes: u64,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_BUCKET.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            compression: true,
            ttl: DEFAULT_TTL,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl BucketConfig {
    /// Create a configuration with the given name and default limits.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            ..Default::default()
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Enable or disable compression.
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Set the TTL for values.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Disable TTL (values never expire).
    pub fn without_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }

    /// Set the maximum total bucket size in bytes.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Check that the configuration can back a bucket.
    pub fn validate(&self) -> Result<()> {
        validate_bucket_name(&self.name)?;
        if self.max_bytes == 0 {
            return Err(KvError::InvalidConfig("max_bytes must be positive".into()));
        }
        if self.ttl == Some(Duration::ZERO) {
            return Err(KvError::InvalidConfig(
                "ttl must be positive; use no ttl to disable expiry".into(),
            ));
        }
        Ok(())
    }

    /// Name of the first setting that differs in a way an existing bucket
    /// cannot absorb, or `None` if `other` only changes the description.
    pub fn conflicting_field(&self, other: &BucketConfig) -> Option<&'static str> {
        if self.compression != other.compression {
            Some("compression")
        } else if self.ttl != other.ttl {
            Some("ttl")
        } else if self.max_bytes != other.max_bytes {
            Some("max_bytes")
        } else {
            None
        }
    }
}

/// Bucket names: ASCII letters, digits, `-` and `_`.
pub fn validate_bucket_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(KvError::InvalidBucketName(name.to_string()))
    }
}

/// Keys: ASCII letters, digits, `-`, `_`, `/`, `=` and `.`, not starting or
/// ending with `.`.
pub fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && !key.ends_with('.')
        && key.bytes().all(|b| {
            b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'/' | b'=' | b'.')
        });
    if valid {
        Ok(())
    } else {
        Err(KvError::InvalidKey(key.to_string()))
    }
}
