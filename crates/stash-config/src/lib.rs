//! Configuration system for Stash.
//!
//! Provides TOML-based configuration with:
//! - `[server]`, `[kv]`, `[session]` and `[logging]` sections
//! - Config file layering (user config dir + project-local overrides)
//! - Environment overrides (`STASH_KV_PORT`, `STASH_SESSION_SECRET`)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    save_config, user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
