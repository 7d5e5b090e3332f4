//! HTTP server for Stash.
//!
//! Two listeners share this crate:
//!
//! - [`Server`] serves the per-session blob API (`/api/v1/mvc`) to browsers.
//! - [`KvTransport`] exposes the key-value substrate (`/kv`) so other
//!   processes can reach its buckets.
//!
//! # Example
//!
//! ```ignore
//! use stash_server::{AppState, Server, ServerConfig};
//!
//! let state = AppState::new(session_cache, ServerConfig::default());
//! Server::from_state(state).run().await?;
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::{ErrorResponse, Result, ServerError};
pub use middleware::request_logging_middleware;
pub use state::{AppState, KvState};

use std::net::SocketAddr;

use axum::{Router, extract::DefaultBodyLimit};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The session blob server.
pub struct Server {
    /// Application state.
    state: AppState,
}

impl Server {
    /// Create a server from a pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        Router::new()
            .merge(routes::session_health_routes())
            .nest("/api/v1", routes::mvc_routes())
            .layer(DefaultBodyLimit::max(self.state.config.max_body_size))
            .layer(axum::middleware::from_fn_with_state(
                self.state.config.clone(),
                middleware::request_logging_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the server on the configured address until the state's shutdown
    /// token is cancelled.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.bind_address;
        self.run_on(addr).await
    }

    /// Run the server on a specific address (useful for testing).
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        let listener = bind(addr).await?;
        self.serve(listener).await
    }

    /// Run the server on an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let shutdown = self.state.shutdown.clone();
        info!(addr = ?listener.local_addr().ok(), "Starting server");
        serve(listener, self.router(), shutdown).await
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }
}

/// The key-value substrate's HTTP transport.
pub struct KvTransport {
    state: KvState,
}

impl KvTransport {
    pub fn from_state(state: KvState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        Router::new()
            .merge(routes::transport_health_routes())
            .merge(routes::kv_routes())
            .layer(DefaultBodyLimit::max(self.state.config.max_body_size))
            .layer(axum::middleware::from_fn_with_state(
                self.state.config.clone(),
                middleware::request_logging_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the transport on the configured address.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.bind_address;
        self.run_on(addr).await
    }

    /// Run the transport on a specific address.
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        let listener = bind(addr).await?;
        self.serve(listener).await
    }

    /// Run the transport on an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let shutdown = self.state.shutdown.clone();
        info!(addr = ?listener.local_addr().ok(), "Starting key-value transport");
        serve(listener, self.router(), shutdown).await
    }
}

async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Internal(format!("Failed to bind {}: {}", addr, e)))
}

async fn serve(listener: TcpListener, router: Router, shutdown: CancellationToken) -> Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| ServerError::Internal(format!("Server error: {}", e)))
}
