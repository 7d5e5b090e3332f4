//! The key-value capability the session cache depends on.
//!
//! [`KeyValueStore`] is object safe so callers can hold an
//! `Arc<dyn KeyValueStore>` backed by an in-process [`MemoryBucket`] or by a
//! remote client talking to one over the network.
//!
//! [`MemoryBucket`]: crate::MemoryBucket

use async_trait::async_trait;
use bytes::Bytes;

use crate::entry::{BucketStatus, Entry};
use crate::error::Result;
use crate::watch::Watch;

/// A single bucket of keys with TTL, size cap and per-key watch.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Name of the bucket.
    fn bucket(&self) -> &str;

    /// Get the most recent value for a key.
    ///
    /// Fails with [`KvError::NotFound`] if the key was never written, was
    /// deleted, or has expired.
    ///
    /// [`KvError::NotFound`]: crate::KvError::NotFound
    async fn get(&self, key: &str) -> Result<Entry>;

    /// Overwrite the value for a key and restart its TTL.
    ///
    /// Returns the revision of the write. Fails with
    /// [`KvError::CapacityExceeded`] without changing the previous value if
    /// the bucket's byte limit would be exceeded.
    ///
    /// [`KvError::CapacityExceeded`]: crate::KvError::CapacityExceeded
    async fn put(&self, key: &str, value: Bytes) -> Result<u64>;

    /// Write a value only if the key holds no live value.
    ///
    /// Fails with [`KvError::KeyExists`] and leaves the stored value alone
    /// otherwise. Expired and deleted keys count as absent.
    ///
    /// [`KvError::KeyExists`]: crate::KvError::KeyExists
    async fn create(&self, key: &str, value: Bytes) -> Result<u64>;

    /// Remove the value for a key. Watchers observe a delete entry.
    async fn delete(&self, key: &str) -> Result<u64>;

    /// Subscribe to a key.
    ///
    /// The current value (if any) is delivered first, followed by every later
    /// write in order.
    async fn watch(&self, key: &str) -> Result<Watch>;

    /// Point-in-time bucket status.
    async fn status(&self) -> Result<BucketStatus>;
}
