//! A remote bucket behind the [`KeyValueStore`] trait.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use stash_kv::{BucketStatus, Entry, KeyValueStore, KvError, Watch, validate_key};
use tokio_util::sync::CancellationToken;

use crate::client::KvClient;

/// A bucket served by a remote transport.
///
/// Failures come back as the same [`KvError`] variants a local bucket would
/// return; network failures become [`KvError::Unavailable`].
#[derive(Debug, Clone)]
pub struct RemoteBucket {
    client: KvClient,
    name: String,
}

impl RemoteBucket {
    pub fn new(client: KvClient, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
        }
    }

    /// The client this bucket talks through.
    pub fn client(&self) -> &KvClient {
        &self.client
    }
}

#[async_trait]
impl KeyValueStore for RemoteBucket {
    fn bucket(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> stash_kv::Result<Entry> {
        validate_key(key)?;
        self.client
            .get(&self.name, key)
            .await
            .map_err(|e| e.into_kv_error(&self.name, key))
    }

    async fn put(&self, key: &str, value: Bytes) -> stash_kv::Result<u64> {
        validate_key(key)?;
        self.client
            .put(&self.name, key, value)
            .await
            .map_err(|e| e.into_kv_error(&self.name, key))
    }

    async fn create(&self, key: &str, value: Bytes) -> stash_kv::Result<u64> {
        validate_key(key)?;
        self.client
            .create(&self.name, key, value)
            .await
            .map_err(|e| e.into_kv_error(&self.name, key))
    }

    async fn delete(&self, key: &str) -> stash_kv::Result<u64> {
        validate_key(key)?;
        self.client
            .delete(&self.name, key)
            .await
            .map_err(|e| e.into_kv_error(&self.name, key))
    }

    async fn watch(&self, key: &str) -> stash_kv::Result<Watch> {
        validate_key(key)?;
        let entries = self
            .client
            .watch(&self.name, key)
            .await
            .map_err(|e| e.into_kv_error(&self.name, key))?;

        let bucket = self.name.clone();
        let watched = key.to_string();
        let entries = entries.map(move |item| item.map_err(|e| e.into_kv_error(&bucket, &watched)));
        Ok(Watch::new(key, &CancellationToken::new(), entries))
    }

    async fn status(&self) -> stash_kv::Result<BucketStatus> {
        self.client
            .status(&self.name)
            .await
            .map_err(|e| e.into_kv_error(&self.name, ""))
    }
}
