//! Application state shared across handlers.

use std::sync::Arc;

use stash_kv::Substrate;
use stash_session::SessionCache;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// State for the MVC routes.
#[derive(Clone)]
pub struct AppState {
    /// Session cache.
    pub sessions: SessionCache,

    /// Server configuration.
    pub config: Arc<ServerConfig>,

    /// Cancelled on shutdown; ends all open watch streams.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create a new application state.
    pub fn new(sessions: SessionCache, config: ServerConfig) -> Self {
        Self {
            sessions,
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }

    /// Tie open watches to an external shutdown token.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}

/// State for the key-value transport routes.
#[derive(Clone)]
pub struct KvState {
    /// Bucket registry served by the transport.
    pub substrate: Substrate,

    /// Transport configuration.
    pub config: Arc<ServerConfig>,

    /// Cancelled on shutdown; ends all open watch streams.
    pub shutdown: CancellationToken,
}

impl KvState {
    pub fn new(substrate: Substrate, config: ServerConfig) -> Self {
        Self {
            substrate,
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}
