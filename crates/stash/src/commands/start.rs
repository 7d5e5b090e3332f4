//! Start command - launches the session server and key-value transport.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use stash_config::KvConfig;
use stash_kv::{BucketConfig, KeyValueStore, Substrate, resolve_port};
use stash_server::{AppState, KvState, KvTransport, Server, ServerConfig};
use stash_session::{CookieOptions, SessionCache, SessionConfig, SignedCookieStore};

use super::Context;

/// Arguments for the start command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Port for the session server (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Preferred key-value transport port; a free port is used if it is taken
    #[arg(long)]
    pub kv_port: Option<u16>,

    /// Cookie signing secret (overrides config)
    #[arg(long, env = "STASH_SESSION_SECRET", hide_env_values = true)]
    pub secret: Option<String>,
}

/// Run the start command.
pub async fn run(args: StartArgs, ctx: &Context) -> Result<()> {
    let config = ctx.config();
    let server_cfg = config.server();
    let kv_cfg = config.kv();
    let session_cfg = config.session();

    let shutdown = CancellationToken::new();

    // ── Substrate ───────────────────────────────────────────────────────
    let substrate = Substrate::with_watch_buffer(kv_cfg.watch_buffer);
    let bucket = substrate
        .create_or_update_bucket(bucket_config(&kv_cfg))
        .context("failed to create session bucket")?;
    let purge = substrate.spawn_purge_task(
        Duration::from_secs(kv_cfg.purge_interval_secs.max(1)),
        shutdown.clone(),
    );

    if ctx.verbose {
        let status = bucket.status().await?;
        println!(
            "Bucket '{}': ttl={:?} max_bytes={} compression={}",
            status.bucket, status.ttl, status.max_bytes, status.compression
        );
    }

    // ── Sessions ────────────────────────────────────────────────────────
    let secret = match args.secret.or(session_cfg.secret.clone()) {
        Some(secret) => secret,
        None => {
            warn!("No session secret configured; sessions will not survive a restart");
            SignedCookieStore::generate_secret()
        }
    };
    let cookies = SignedCookieStore::new(secret).with_options(CookieOptions {
        max_age: session_cfg.max_age_secs.map(Duration::from_secs),
        secure: session_cfg.secure,
        ..CookieOptions::default()
    });
    let store: Arc<dyn KeyValueStore> = bucket;
    let sessions = SessionCache::with_config(
        store,
        Arc::new(cookies),
        SessionConfig::new()
            .with_cookie_name(&session_cfg.cookie_name)
            .with_id_field(&session_cfg.id_field),
    );

    // ── Listeners ───────────────────────────────────────────────────────
    let kv_port = resolve_port(args.kv_port.or(kv_cfg.port))
        .context("failed to find a port for the key-value transport")?;
    let kv_addr = socket_addr(&kv_cfg.bind, kv_port)?;
    let addr = socket_addr(
        args.bind.as_deref().unwrap_or(&server_cfg.bind),
        args.port.unwrap_or(server_cfg.port),
    )?;

    let kv_listener = TcpListener::bind(kv_addr)
        .await
        .with_context(|| format!("failed to bind key-value transport to {}", kv_addr))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind server to {}", addr))?;

    let kv_state = KvState::new(
        substrate.clone(),
        ServerConfig::new()
            .with_bind_address(kv_addr)
            .with_request_logging(server_cfg.request_logging),
    )
    .with_shutdown(shutdown.clone());
    let app_state = AppState::new(
        sessions,
        ServerConfig::new()
            .with_bind_address(addr)
            .with_request_logging(server_cfg.request_logging),
    )
    .with_shutdown(shutdown.clone());

    let kv_url = format!("http://{}", kv_addr);
    let addr_file = ctx.kv_addr_file();
    if let Some(path) = &addr_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &kv_url)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    println!("Stash server starting on http://{}", addr);
    println!("Key-value transport on {}", kv_url);
    println!("Press Ctrl+C to stop");
    info!(%addr, %kv_addr, bucket = %kv_cfg.bucket, "Stash started");

    // ── Run until Ctrl+C ────────────────────────────────────────────────
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C"),
        }
        signal_token.cancel();
    });

    let result = tokio::try_join!(
        KvTransport::from_state(kv_state).serve(kv_listener),
        Server::from_state(app_state).serve(listener),
    );

    // ── Graceful shutdown ──────────────────────────────────────────────
    shutdown.cancel();
    if let Err(e) = purge.await {
        warn!(error = %e, "Expiry sweep task failed");
    }
    if let Some(path) = &addr_file
        && std::fs::read_to_string(path).is_ok_and(|s| s.trim() == kv_url)
        && let Err(e) = std::fs::remove_file(path)
    {
        warn!(path = %path.display(), error = %e, "Failed to remove transport address file");
    }

    result?;
    println!("Stash stopped");
    Ok(())
}

/// Session bucket settings from the `[kv]` section. `ttl_secs = 0` disables
/// expiry.
fn bucket_config(kv: &KvConfig) -> BucketConfig {
    let config = BucketConfig::new(&kv.bucket)
        .with_description(&kv.description)
        .with_compression(kv.compression)
        .with_max_bytes(kv.max_bytes);
    if kv.ttl_secs == 0 {
        config.without_ttl()
    } else {
        config.with_ttl(Duration::from_secs(kv.ttl_secs))
    }
}

fn socket_addr(bind: &str, port: u16) -> Result<SocketAddr> {
    let ip: IpAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", bind))?;
    Ok(SocketAddr::new(ip, port))
}
