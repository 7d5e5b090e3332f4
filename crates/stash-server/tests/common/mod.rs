//! Common test utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use stash_kv::{BucketConfig, Substrate};
use stash_server::{AppState, KvState, KvTransport, Server, ServerConfig};
use stash_session::{SessionCache, SignedCookieStore};

/// Session server plus key-value transport running in the background.
pub struct TestServer {
    /// Session server address.
    pub addr: SocketAddr,
    /// Transport address.
    pub kv_addr: SocketAddr,
    /// Shared substrate behind both listeners.
    pub substrate: Substrate,
    /// HTTP client.
    pub client: Client,
    shutdown: CancellationToken,
    _handles: Vec<JoinHandle<()>>,
}

impl TestServer {
    /// Start both listeners on ephemeral ports.
    pub async fn start() -> Result<Self> {
        let substrate = Substrate::new();
        let bucket = substrate.create_or_update_bucket(BucketConfig::default())?;
        let shutdown = CancellationToken::new();

        let config = ServerConfig::new().with_request_logging(false);
        let sessions = SessionCache::new(bucket, Arc::new(SignedCookieStore::new("test-secret")));
        let state = AppState::new(sessions, config.clone()).with_shutdown(shutdown.clone());
        let kv_state = KvState::new(substrate.clone(), config).with_shutdown(shutdown.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let kv_listener = TcpListener::bind("127.0.0.1:0").await?;
        let kv_addr = kv_listener.local_addr()?;

        let server = tokio::spawn(async move {
            let _ = Server::from_state(state).serve(listener).await;
        });
        let transport = tokio::spawn(async move {
            let _ = KvTransport::from_state(kv_state).serve(kv_listener).await;
        });

        let client = Client::new();
        wait_for_server(&client, addr).await?;
        wait_for_server(&client, kv_addr).await?;

        Ok(Self {
            addr,
            kv_addr,
            substrate,
            client,
            shutdown,
            _handles: vec![server, transport],
        })
    }

    /// Base URL of the session server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Base URL of the transport.
    pub fn kv_url(&self) -> String {
        format!("http://{}", self.kv_addr)
    }

    /// GET request to the session server, carrying `cookie` if given.
    pub fn get(&self, path: &str, cookie: Option<&str>) -> reqwest::RequestBuilder {
        with_cookie(
            self.client.get(format!("{}{}", self.base_url(), path)),
            cookie,
        )
    }

    /// PUT request to the session server, carrying `cookie` if given.
    pub fn put(&self, path: &str, cookie: Option<&str>) -> reqwest::RequestBuilder {
        with_cookie(
            self.client.put(format!("{}{}", self.base_url(), path)),
            cookie,
        )
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn with_cookie(builder: reqwest::RequestBuilder, cookie: Option<&str>) -> reqwest::RequestBuilder {
    match cookie {
        Some(cookie) => builder.header(reqwest::header::COOKIE, cookie),
        None => builder,
    }
}

/// The `name=value` part of a response's `Set-Cookie` header.
pub fn session_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::SET_COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .next()
        .map(str::to_string)
}

/// Wait for the server to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/health", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return,
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}
