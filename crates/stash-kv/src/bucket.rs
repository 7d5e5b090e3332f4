//! In-memory bucket with TTL expiry, byte cap, compression and watch fan-out.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::codec::StoredValue;
use crate::config::{BucketConfig, validate_key};
use crate::entry::{BucketStatus, Entry, Operation};
use crate::error::{KvError, Result};
use crate::expiry::ExpiryTracker;
use crate::store::KeyValueStore;
use crate::watch::Watch;

/// Default number of undelivered updates a watcher may fall behind by.
pub const DEFAULT_WATCH_BUFFER: usize = 256;

/// A stored value with its write metadata.
#[derive(Debug, Clone)]
struct Slot {
    stored: StoredValue,
    revision: u64,
    created: DateTime<Utc>,
}

impl Slot {
    /// Bytes charged against the bucket limit for this key.
    fn cost(&self, key: &str) -> u64 {
        key.len() as u64 + self.stored.stored_len()
    }
}

/// Inner state protected by RwLock.
struct BucketInner {
    /// Live values by key.
    values: HashMap<String, Slot>,

    /// Write-time tracker for expiry.
    expiry: ExpiryTracker,

    /// Bytes charged against the limit.
    bytes: u64,

    /// Last revision handed out.
    revision: u64,

    /// Per-key fan-out channels.
    watchers: HashMap<String, broadcast::Sender<Entry>>,
}

impl BucketInner {
    /// Drop a key whose value has expired. Returns true if one was dropped.
    fn reclaim_if_expired(&mut self, key: &str) -> bool {
        if !self.values.contains_key(key) || !self.expiry.is_expired(key) {
            return false;
        }
        self.expiry.remove(key);
        if let Some(slot) = self.values.remove(key) {
            self.bytes = self.bytes.saturating_sub(slot.cost(key));
        }
        true
    }

    /// Drop every expired key. Returns how many were dropped.
    fn purge_expired(&mut self) -> usize {
        let expired = self.expiry.drain_expired();
        let mut count = 0;
        for key in expired {
            if let Some(slot) = self.values.remove(&key) {
                self.bytes = self.bytes.saturating_sub(slot.cost(&key));
                count += 1;
            }
        }
        count
    }

    /// Bytes currently charged for a key.
    fn cost_of(&self, key: &str) -> u64 {
        self.values.get(key).map(|slot| slot.cost(key)).unwrap_or(0)
    }

    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    /// Deliver an entry to the key's watchers, dropping the channel once
    /// nobody is listening.
    fn publish(&mut self, entry: Entry) {
        let key = entry.key.clone();
        let orphaned = match self.watchers.get(&key) {
            Some(tx) => tx.send(entry).is_err(),
            None => false,
        };
        if orphaned {
            trace!(key = %key, "Dropping watch channel with no receivers");
            self.watchers.remove(&key);
        }
    }
}

/// A bucket held in process memory.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct MemoryBucket {
    /// Bucket name, fixed at creation.
    name: String,

    /// Bucket configuration; only the description changes after creation.
    config: parking_lot::RwLock<BucketConfig>,

    /// Values, expiry and watchers.
    inner: RwLock<BucketInner>,

    /// Capacity of each key's broadcast channel.
    watch_buffer: usize,
}

impl MemoryBucket {
    /// Create an empty bucket from a validated configuration.
    pub fn new(config: BucketConfig) -> Result<Self> {
        Self::with_watch_buffer(config, DEFAULT_WATCH_BUFFER)
    }

    /// Create an empty bucket with a custom watcher buffer size.
    pub fn with_watch_buffer(config: BucketConfig, watch_buffer: usize) -> Result<Self> {
        config.validate()?;
        let inner = BucketInner {
            values: HashMap::new(),
            expiry: ExpiryTracker::new(config.ttl),
            bytes: 0,
            revision: 0,
            watchers: HashMap::new(),
        };
        Ok(Self {
            name: config.name.clone(),
            config: parking_lot::RwLock::new(config),
            inner: RwLock::new(inner),
            watch_buffer: watch_buffer.max(1),
        })
    }

    /// Current configuration.
    pub fn config(&self) -> BucketConfig {
        self.config.read().clone()
    }

    /// Replace the description.
    pub(crate) fn set_description(&self, description: String) {
        self.config.write().description = description;
    }

    /// Remove all expired values. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut inner = self.inner.write().await;
        let count = inner.purge_expired();
        if count > 0 {
            debug!(
                bucket = %self.name,
                count,
                bytes = inner.bytes,
                "Purged expired values"
            );
        }
        count
    }

    /// Number of live subscriptions on a key.
    pub async fn watcher_count(&self, key: &str) -> usize {
        let inner = self.inner.read().await;
        inner
            .watchers
            .get(key)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Store a value, optionally refusing to replace a live one.
    async fn write(&self, key: &str, value: Bytes, if_absent: bool) -> Result<u64> {
        validate_key(key)?;

        let (compression, max_bytes) = {
            let config = self.config.read();
            (config.compression, config.max_bytes)
        };
        let bucket = self.name.clone();

        // Compress before taking the lock.
        let stored = StoredValue::encode(&value, compression)?;
        let new_cost = key.len() as u64 + stored.stored_len();

        let mut inner = self.inner.write().await;
        inner.reclaim_if_expired(key);
        if if_absent && inner.values.contains_key(key) {
            trace!(bucket = %bucket, key = %key, "Create refused, key exists");
            return Err(KvError::KeyExists {
                key: key.to_string(),
            });
        }

        let mut projected = inner.bytes - inner.cost_of(key) + new_cost;
        if projected > max_bytes {
            // Expired values still on the books should not block a write.
            inner.purge_expired();
            projected = inner.bytes - inner.cost_of(key) + new_cost;
        }
        if projected > max_bytes {
            warn!(
                bucket = %bucket,
                key = %key,
                used = inner.bytes,
                requested = new_cost,
                limit = max_bytes,
                "Write rejected, bucket full"
            );
            return Err(KvError::CapacityExceeded {
                bucket,
                limit: max_bytes,
            });
        }

        let revision = inner.next_revision();
        let created = Utc::now();
        inner.values.insert(
            key.to_string(),
            Slot {
                stored,
                revision,
                created,
            },
        );
        inner.expiry.touch(key);
        inner.bytes = projected;

        trace!(
            bucket = %bucket,
            key = %key,
            revision,
            bytes = inner.bytes,
            "Value stored"
        );

        inner.publish(Entry {
            bucket,
            key: key.to_string(),
            value,
            revision,
            created,
            operation: Operation::Put,
        });

        Ok(revision)
    }

    fn entry(&self, key: &str, slot: &Slot, value: Bytes) -> Entry {
        Entry {
            bucket: self.name.clone(),
            key: key.to_string(),
            value,
            revision: slot.revision,
            created: slot.created,
            operation: Operation::Put,
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryBucket {
    fn bucket(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Entry> {
        validate_key(key)?;

        let slot = {
            let inner = self.inner.read().await;
            if inner.expiry.is_expired(key) {
                None
            } else {
                inner.values.get(key).cloned()
            }
        };

        match slot {
            Some(slot) => {
                let value = slot.stored.decode()?;
                trace!(key = %key, revision = slot.revision, "Value found");
                Ok(self.entry(key, &slot, value))
            }
            None => {
                let mut inner = self.inner.write().await;
                if inner.reclaim_if_expired(key) {
                    debug!(key = %key, "Value expired, reclaimed on read");
                }
                Err(KvError::NotFound {
                    key: key.to_string(),
                })
            }
        }
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<u64> {
        self.write(key, value, false).await
    }

    async fn create(&self, key: &str, value: Bytes) -> Result<u64> {
        self.write(key, value, true).await
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        validate_key(key)?;
        let bucket = self.name.clone();

        let mut inner = self.inner.write().await;
        inner.expiry.remove(key);
        if let Some(slot) = inner.values.remove(key) {
            inner.bytes = inner.bytes.saturating_sub(slot.cost(key));
        }

        let revision = inner.next_revision();
        debug!(bucket = %bucket, key = %key, revision, "Value deleted");

        inner.publish(Entry {
            bucket,
            key: key.to_string(),
            value: Bytes::new(),
            revision,
            created: Utc::now(),
            operation: Operation::Delete,
        });

        Ok(revision)
    }

    async fn watch(&self, key: &str) -> Result<Watch> {
        validate_key(key)?;

        // Subscribe and snapshot under one lock so no write falls between
        // the initial value and the live feed.
        let (current, mut rx) = {
            let mut inner = self.inner.write().await;
            inner.reclaim_if_expired(key);
            let current = inner.values.get(key).cloned();
            let buffer = self.watch_buffer;
            let rx = inner
                .watchers
                .entry(key.to_string())
                .or_insert_with(|| broadcast::channel(buffer).0)
                .subscribe();
            (current, rx)
        };

        let initial = match current {
            Some(slot) => Some(slot.stored.decode().map(|value| self.entry(key, &slot, value))),
            None => None,
        };

        debug!(key = %key, has_initial = initial.is_some(), "Watch started");

        let watched = key.to_string();
        let entries = async_stream::stream! {
            if let Some(initial) = initial {
                yield initial;
            }
            loop {
                match rx.recv().await {
                    Ok(entry) => yield Ok(entry),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(key = %watched, skipped, "Watcher fell behind");
                        yield Err(KvError::WatchLagged { key: watched.clone(), skipped });
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        Ok(Watch::new(key, &CancellationToken::new(), entries))
    }

    async fn status(&self) -> Result<BucketStatus> {
        let config = self.config();
        let inner = self.inner.read().await;
        let values = inner
            .values
            .keys()
            .filter(|key| !inner.expiry.is_expired(key))
            .count();
        Ok(BucketStatus {
            bucket: config.name,
            description: config.description,
            values,
            bytes: inner.bytes,
            ttl: config.ttl,
            max_bytes: config.max_bytes,
            compression: config.compression,
        })
    }
}

impl std::fmt::Debug for MemoryBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBucket")
            .field("config", &*self.config.read())
            .finish()
    }
}
