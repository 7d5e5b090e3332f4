//! HTTP client for the Stash key-value transport.
//!
//! [`KvClient`] talks to a `stash` process's `/kv` endpoints.
//! [`RemoteBucket`] wraps one bucket behind
//! [`KeyValueStore`](stash_kv::KeyValueStore), so a session cache can run
//! against a substrate in another process.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stash_client::KvClient;
//! use stash_kv::KeyValueStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KvClient::localhost(4222)?;
//! let store: Arc<dyn KeyValueStore> = Arc::new(client.bucket("todos"));
//!
//! store.put("abc123", "hello".into()).await?;
//! let entry = store.get("abc123").await?;
//! println!("revision {}", entry.revision);
//! # Ok(())
//! # }
//! ```

mod bucket;
mod client;
pub mod error;
pub mod types;

pub use bucket::RemoteBucket;
pub use client::{ClientBuilder, KvClient};
pub use error::{Error, ErrorResponse, Result};
pub use types::{HealthResponse, RevisionResponse, WireEntry};
