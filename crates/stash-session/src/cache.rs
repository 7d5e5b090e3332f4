//! Session-scoped blob cache.

use std::sync::Arc;

use bytes::Bytes;
use http::HeaderMap;
use stash_kv::{KeyValueStore, Watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::SessionConfig;
use crate::cookie::CookieStore;
use crate::error::{Error, Result};
use crate::id::SessionId;
use crate::response::ResponseHead;

/// Binds clients to session identifiers and stores one blob per session.
///
/// The cache holds no per-session state of its own. Identifiers live in the
/// client's cookie, blobs live in the key-value store, and both are shared
/// by every request that clones the cache.
#[derive(Clone)]
pub struct SessionCache {
    store: Arc<dyn KeyValueStore>,
    cookies: Arc<dyn CookieStore>,
    config: SessionConfig,
}

impl SessionCache {
    /// Create a cache with the default cookie and field names.
    pub fn new(store: Arc<dyn KeyValueStore>, cookies: Arc<dyn CookieStore>) -> Self {
        Self::with_config(store, cookies, SessionConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn KeyValueStore>,
        cookies: Arc<dyn CookieStore>,
        config: SessionConfig,
    ) -> Self {
        Self {
            store,
            cookies,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Return the identifier carried by the request's session cookie, minting
    /// and persisting a new one if there is none.
    ///
    /// Does not touch the key-value store. The cookie is only written when a
    /// new identifier is minted.
    pub fn resolve_session(
        &self,
        request: &HeaderMap,
        response: &mut ResponseHead,
    ) -> Result<SessionId> {
        let mut session = self
            .cookies
            .get(request, &self.config.cookie_name)
            .map_err(Error::SessionLoad)?;

        if let Some(id) = session.get_str(&self.config.id_field) {
            trace!(session_id = %id, "Session resolved from cookie");
            return Ok(SessionId::from(id));
        }

        let id = SessionId::generate();
        session.insert(self.config.id_field.clone(), id.as_str());
        self.cookies
            .save(&session, response)
            .map_err(Error::SessionPersist)?;

        info!(session_id = %id, "New session assigned");
        Ok(id)
    }

    /// Resolve the session and read its blob.
    ///
    /// A session the store has never seen (or whose blob expired) gets an
    /// empty blob written eagerly, so watchers have a key to follow. The
    /// empty blob never replaces one saved since the read. If that write
    /// fails, the read fails too.
    pub async fn get_session_blob(
        &self,
        request: &HeaderMap,
        response: &mut ResponseHead,
    ) -> Result<(SessionId, Bytes)> {
        let id = self.resolve_session(request, response)?;

        match self.store.get(id.as_str()).await {
            Ok(entry) => {
                trace!(session_id = %id, revision = entry.revision, "Session blob loaded");
                Ok((id, entry.value))
            }
            Err(err) if err.is_not_found() => self.initialize_blob(id).await,
            Err(err) => Err(Error::store("get", err)),
        }
    }

    /// Create the empty blob for a session, or return whatever a concurrent
    /// save stored first.
    async fn initialize_blob(&self, id: SessionId) -> Result<(SessionId, Bytes)> {
        match self.store.create(id.as_str(), Bytes::new()).await {
            Ok(revision) => {
                debug!(session_id = %id, revision, "Session blob initialized");
                Ok((id, Bytes::new()))
            }
            Err(err) if err.is_key_exists() => {
                let entry = self
                    .store
                    .get(id.as_str())
                    .await
                    .map_err(|e| Error::store("get", e))?;
                debug!(
                    session_id = %id,
                    revision = entry.revision,
                    "Session blob saved during initialization, keeping it"
                );
                Ok((id, entry.value))
            }
            Err(err) => Err(Error::store("initialize", err)),
        }
    }

    /// Overwrite the session's blob. Last writer wins.
    pub async fn save_session_blob(&self, id: &SessionId, blob: Bytes) -> Result<()> {
        let len = blob.len();
        let revision = self
            .store
            .put(id.as_str(), blob)
            .await
            .map_err(|e| Error::store("put", e))?;
        trace!(session_id = %id, revision, len, "Session blob saved");
        Ok(())
    }

    /// Subscribe to changes of the session's blob.
    ///
    /// The stream ends when `cancel` is cancelled or the returned watch is
    /// stopped or dropped.
    pub async fn watch_session_updates(
        &self,
        cancel: &CancellationToken,
        id: &SessionId,
    ) -> Result<Watch> {
        let watch = self
            .store
            .watch(id.as_str())
            .await
            .map_err(|e| Error::store("watch", e))?;
        debug!(session_id = %id, "Watching session blob");
        Ok(watch.bind(cancel))
    }
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("bucket", &self.store.bucket())
            .field("config", &self.config)
            .finish()
    }
}
