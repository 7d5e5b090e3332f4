//! Wire types for the key-value transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header carrying an entry's revision.
pub const REVISION_HEADER: &str = "x-kv-revision";

/// Header carrying an entry's creation time (RFC 3339).
pub const CREATED_HEADER: &str = "x-kv-created";

/// Header carrying an entry's operation.
pub const OPERATION_HEADER: &str = "x-kv-operation";

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Buckets the transport serves.
    #[serde(default)]
    pub buckets: Vec<String>,
}

/// Response to writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionResponse {
    pub revision: u64,
}

/// Entry as sent on a watch stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEntry {
    pub key: String,
    pub revision: u64,
    pub created: DateTime<Utc>,
    /// Base64-encoded value.
    pub value: String,
}
