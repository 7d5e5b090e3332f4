//! Key-value substrate for Stash.
//!
//! Values live in named buckets. Each bucket has an optional time-to-live,
//! a byte limit, optional zstd compression, and per-key watch streams.
//!
//! # Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use stash_kv::{BucketConfig, KeyValueStore, Substrate};
//!
//! # async fn example() -> stash_kv::Result<()> {
//! let substrate = Substrate::new();
//! let bucket = substrate.create_or_update_bucket(BucketConfig::default())?;
//!
//! bucket.put("abc123", Bytes::from_static(b"hello")).await?;
//! let entry = bucket.get("abc123").await?;
//! assert_eq!(entry.value, Bytes::from_static(b"hello"));
//! # Ok(())
//! # }
//! ```

mod bucket;
mod codec;
mod config;
mod entry;
mod error;
mod expiry;
mod port;
mod store;
mod substrate;
mod watch;

pub use bucket::{DEFAULT_WATCH_BUFFER, MemoryBucket};
pub use config::{
    BucketConfig, DEFAULT_BUCKET, DEFAULT_DESCRIPTION, DEFAULT_MAX_BYTES, DEFAULT_TTL,
    validate_bucket_name, validate_key,
};
pub use entry::{BucketStatus, Entry, Operation};
pub use error::{KvError, Result};
pub use port::{free_port, is_port_free, resolve_port};
pub use store::KeyValueStore;
pub use substrate::{DEFAULT_PURGE_INTERVAL, Substrate};
pub use watch::Watch;
