//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [server]     # MVC HTTP listener
//! [kv]         # key-value substrate and its transport
//! [session]    # session cookie
//! [logging]    # console and file logging
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Environment variable overriding the substrate transport port.
pub const KV_PORT_ENV: &str = "STASH_KV_PORT";

/// Environment variable holding the cookie signing secret.
pub const SESSION_SECRET_ENV: &str = "STASH_SESSION_SECRET";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StashConfig {
    /// MVC server configuration.
    pub server: Option<ServerConfig>,

    /// Key-value substrate configuration.
    pub kv: Option<KvConfig>,

    /// Session cookie configuration.
    pub session: Option<SessionConfig>,

    /// Logging configuration.
    pub logging: Option<LoggingConfig>,
}

impl StashConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: StashConfig) {
        if other.server.is_some() {
            self.server = other.server;
        }

        if other.kv.is_some() {
            self.kv = other.kv;
        }

        if other.session.is_some() {
            self.session = other.session;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Apply `STASH_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup. Empty values are
    /// ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |var: &str| lookup(var).filter(|v| !v.is_empty());

        if let Some(value) = lookup(KV_PORT_ENV) {
            let port = value.parse::<u16>().map_err(|_| ConfigError::InvalidEnv {
                var: KV_PORT_ENV,
                value: value.clone(),
            })?;
            self.kv.get_or_insert_with(KvConfig::default).port = Some(port);
        }

        if let Some(secret) = lookup(SESSION_SECRET_ENV) {
            self.session.get_or_insert_with(SessionConfig::default).secret = Some(secret);
        }

        Ok(())
    }

    /// The `[server]` section, or defaults.
    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    /// The `[kv]` section, or defaults.
    pub fn kv(&self) -> KvConfig {
        self.kv.clone().unwrap_or_default()
    }

    /// The `[session]` section, or defaults.
    pub fn session(&self) -> SessionConfig {
        self.session.clone().unwrap_or_default()
    }

    /// The `[logging]` section, or defaults.
    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// MVC server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on.
    pub port: u16,
    /// Address to bind to.
    pub bind: String,
    /// Enable request logging.
    pub request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind: "127.0.0.1".to_string(),
            request_logging: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Key-Value Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Substrate and session bucket settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KvConfig {
    /// Preferred transport port. Used only if free; otherwise a free port is
    /// chosen.
    pub port: Option<u16>,
    /// Address the transport binds to.
    pub bind: String,
    /// Session bucket name.
    pub bucket: String,
    /// Session bucket description.
    pub description: String,
    /// Value time-to-live in seconds. `0` disables expiry.
    pub ttl_secs: u64,
    /// Bucket byte limit.
    pub max_bytes: u64,
    /// Store values compressed.
    pub compression: bool,
    /// Seconds between expiry sweeps.
    pub purge_interval_secs: u64,
    /// Updates a watcher may fall behind by before it is cut off.
    pub watch_buffer: usize,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            port: None,
            bind: "127.0.0.1".to_string(),
            bucket: "todos".to_string(),
            description: "Datastar Todos".to_string(),
            ttl_secs: 3600,
            max_bytes: 16 * 1024 * 1024,
            compression: true,
            purge_interval_secs: 60,
            watch_buffer: 256,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Session cookie settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie name.
    pub cookie_name: String,
    /// Field within the cookie holding the session id.
    pub id_field: String,
    /// Cookie signing secret. Generated per process when unset.
    pub secret: Option<String>,
    /// Cookie lifetime in seconds. `None` makes a browser-session cookie.
    pub max_age_secs: Option<u64>,
    /// Set the `Secure` attribute.
    pub secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "connections".to_string(),
            id_field: "id".to_string(),
            secret: None,
            max_age_secs: Some(30 * 24 * 60 * 60),
            secure: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset (e.g. `"info"`).
    pub level: String,
    /// Write JSON logs to a daily-rolling file.
    pub file: bool,
    /// Directory for log files. Defaults to `<config dir>/logs`.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: true,
            dir: None,
        }
    }
}
