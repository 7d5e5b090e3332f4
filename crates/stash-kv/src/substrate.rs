//! Registry of named buckets.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bucket::{DEFAULT_WATCH_BUFFER, MemoryBucket};
use crate::config::{BucketConfig, validate_bucket_name};
use crate::error::{KvError, Result};

/// Default interval between expiry sweeps.
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Process-wide set of buckets.
///
/// Clones share the same buckets. Pass it (or individual buckets) to the
/// components that need storage rather than reaching for a global.
#[derive(Clone)]
pub struct Substrate {
    buckets: Arc<RwLock<HashMap<String, Arc<MemoryBucket>>>>,
    watch_buffer: usize,
}

impl Default for Substrate {
    fn default() -> Self {
        Self::new()
    }
}

impl Substrate {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::with_watch_buffer(DEFAULT_WATCH_BUFFER)
    }

    /// Create an empty registry whose buckets buffer `watch_buffer` updates
    /// per watcher.
    pub fn with_watch_buffer(watch_buffer: usize) -> Self {
        Self {
            buckets: Arc::new(RwLock::new(HashMap::new())),
            watch_buffer,
        }
    }

    /// Create a bucket, or return the existing one if its configuration is
    /// compatible.
    ///
    /// Re-creating with an unchanged configuration is a no-op. A changed
    /// description is applied. Any other change fails with
    /// [`KvError::ConfigConflict`] and leaves the bucket untouched.
    pub fn create_or_update_bucket(&self, config: BucketConfig) -> Result<Arc<MemoryBucket>> {
        config.validate()?;

        let mut buckets = self.buckets.write();
        if let Some(existing) = buckets.get(&config.name) {
            let current = existing.config();
            if let Some(field) = current.conflicting_field(&config) {
                return Err(KvError::ConfigConflict {
                    bucket: config.name,
                    field: field.to_string(),
                });
            }
            if current.description != config.description {
                debug!(bucket = %config.name, "Updating bucket description");
                existing.set_description(config.description);
            }
            return Ok(Arc::clone(existing));
        }

        info!(
            bucket = %config.name,
            compression = config.compression,
            ttl_secs = ?config.ttl.map(|t| t.as_secs()),
            max_bytes = config.max_bytes,
            "Creating bucket"
        );
        let name = config.name.clone();
        let bucket = Arc::new(MemoryBucket::with_watch_buffer(config, self.watch_buffer)?);
        buckets.insert(name, Arc::clone(&bucket));
        Ok(bucket)
    }

    /// Look up an existing bucket.
    pub fn bucket(&self, name: &str) -> Result<Arc<MemoryBucket>> {
        validate_bucket_name(name)?;
        self.buckets
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| KvError::BucketNotFound(name.to_string()))
    }

    /// Names of all buckets, sorted.
    pub fn bucket_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.buckets.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Sweep expired values from every bucket. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let buckets: Vec<Arc<MemoryBucket>> = self.buckets.read().values().cloned().collect();
        let mut total = 0;
        for bucket in buckets {
            total += bucket.purge_expired().await;
        }
        total
    }

    /// Run [`Substrate::purge_expired`] every `interval` until `shutdown` is
    /// cancelled.
    pub fn spawn_purge_task(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let substrate = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = substrate.purge_expired().await;
                        if purged > 0 {
                            debug!(purged, "Expiry sweep complete");
                        }
                    }
                }
            }
            debug!("Expiry sweep stopped");
        })
    }
}
