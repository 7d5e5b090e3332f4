//! Values returned by buckets and delivered to watchers.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of change an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// A value was written.
    Put,
    /// The value was removed.
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Put => "put",
            Operation::Delete => "delete",
        }
    }
}

/// A value at a given revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Bucket the entry belongs to.
    pub bucket: String,

    /// Key within the bucket.
    pub key: String,

    /// Uncompressed value. Empty for deletes.
    pub value: Bytes,

    /// Bucket-wide sequence number of the write that produced this entry.
    pub revision: u64,

    /// When the write happened.
    pub created: DateTime<Utc>,

    /// What the write did.
    pub operation: Operation,
}

/// Point-in-time view of a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketStatus {
    /// Bucket name.
    pub bucket: String,

    /// Human-readable description.
    pub description: String,

    /// Number of live (unexpired) values.
    pub values: usize,

    /// Bytes currently charged against the limit.
    pub bytes: u64,

    /// Value time-to-live.
    pub ttl: Option<Duration>,

    /// Byte limit.
    pub max_bytes: u64,

    /// Whether values are stored compressed.
    pub compression: bool,
}
