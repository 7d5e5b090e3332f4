//! CLI command handlers.

pub mod config;
pub mod kv;
pub mod start;
pub mod status;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use stash_client::KvClient;
use stash_config::{LoadedConfig, StashConfig};

/// File in the config directory where a running `stash start` records its
/// transport URL.
pub const KV_ADDR_FILE: &str = "kv.addr";

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration and where it came from.
    pub loaded: LoadedConfig,
    /// Resolved user config directory.
    pub config_dir: Option<PathBuf>,
    /// Explicit transport URL from `--kv-url`.
    pub kv_url: Option<String>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    pub fn config(&self) -> &StashConfig {
        &self.loaded.config
    }

    /// Path of the transport address file, if there is a config directory.
    pub fn kv_addr_file(&self) -> Option<PathBuf> {
        self.config_dir.as_ref().map(|d| d.join(KV_ADDR_FILE))
    }

    /// Transport URL: `--kv-url`, then the address file written by
    /// `stash start`, then a fixed `[kv] port`.
    pub fn resolve_kv_url(&self) -> Option<String> {
        if let Some(url) = &self.kv_url {
            return Some(url.clone());
        }

        if let Some(path) = self.kv_addr_file()
            && let Ok(contents) = std::fs::read_to_string(&path)
        {
            let url = contents.trim();
            if !url.is_empty() {
                return Some(url.to_string());
            }
        }

        let kv = self.config().kv();
        kv.port.map(|port| http_url(&kv.bind, port))
    }

    /// Client for the key-value transport.
    pub fn kv_client(&self) -> Result<KvClient> {
        let Some(url) = self.resolve_kv_url() else {
            bail!("key-value transport address unknown; start a server or pass --kv-url");
        };
        KvClient::builder()
            .base_url(&url)
            .build()
            .with_context(|| format!("invalid transport URL '{}'", url))
    }
}

/// `http://` URL for a bind host and port. IPv6 literals are bracketed.
pub fn http_url(bind: &str, port: u16) -> String {
    match bind.parse::<IpAddr>() {
        Ok(ip) => format!("http://{}", SocketAddr::new(ip, port)),
        Err(_) => format!("http://{}:{}", bind, port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_config::KvConfig;

    fn context(config: StashConfig, config_dir: Option<PathBuf>) -> Context {
        Context {
            loaded: LoadedConfig {
                config,
                sources: Vec::new(),
                warnings: Vec::new(),
            },
            config_dir,
            kv_url: None,
            json_output: false,
            verbose: false,
        }
    }

    #[test]
    fn test_kv_url_flag_wins() {
        let mut ctx = context(StashConfig::new(), None);
        ctx.kv_url = Some("http://10.0.0.1:9000".to_string());
        assert_eq!(ctx.resolve_kv_url().as_deref(), Some("http://10.0.0.1:9000"));
    }

    #[test]
    fn test_kv_url_from_fixed_port() {
        let mut config = StashConfig::new();
        config.kv = Some(KvConfig {
            port: Some(4222),
            ..KvConfig::default()
        });
        let ctx = context(config, None);
        assert_eq!(ctx.resolve_kv_url().as_deref(), Some("http://127.0.0.1:4222"));
    }

    #[test]
    fn test_kv_url_brackets_ipv6_bind() {
        let mut config = StashConfig::new();
        config.kv = Some(KvConfig {
            bind: "::1".to_string(),
            port: Some(4222),
            ..KvConfig::default()
        });
        let ctx = context(config, None);
        assert_eq!(ctx.resolve_kv_url().as_deref(), Some("http://[::1]:4222"));
        assert!(ctx.kv_client().is_ok());
    }

    #[test]
    fn test_http_url_hostname() {
        assert_eq!(http_url("localhost", 8080), "http://localhost:8080");
    }

    #[test]
    fn test_kv_url_unknown_without_port() {
        let ctx = context(StashConfig::new(), None);
        assert!(ctx.resolve_kv_url().is_none());
        assert!(ctx.kv_client().is_err());
    }
}
