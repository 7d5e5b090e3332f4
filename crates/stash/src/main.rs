//! Stash - session-scoped, watchable blob cache.
//!
//! Main entry point for the Stash CLI.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use stash_config::LoggingConfig;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;

mod commands;

use commands::{config, kv, start, status};

/// Crates whose log levels follow `--verbose` and `[logging] level`.
const LOG_TARGETS: &[&str] = &[
    "stash",
    "stash_kv",
    "stash_session",
    "stash_server",
    "stash_client",
    "stash_config",
];

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Stash - session-scoped, watchable blob cache
#[derive(Parser)]
#[command(name = "stash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// User config directory (default: platform config dir)
    #[arg(long, global = true, env = "STASH_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Key-value transport URL (default: discovered from a running server)
    #[arg(long, global = true, env = "STASH_KV_URL")]
    pub kv_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the session server and key-value transport
    Start(start::StartArgs),

    /// Show whether the server and transport are reachable
    Status(status::StatusArgs),

    /// Key-value operations against a running transport
    Kv(kv::KvArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_dir = cli.config_dir.clone().or_else(stash_config::user_config_dir);
    let loaded = stash_config::load_config_with_options(None, config_dir.as_deref())?;

    let _guard = init_tracing(cli.verbose, &loaded.config.logging(), config_dir.as_deref());
    for warning in &loaded.warnings {
        warn!("{}", warning);
    }

    // Create context for commands
    let ctx = commands::Context {
        loaded,
        config_dir,
        kv_url: cli.kv_url,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Start(args) => start::run(args, &ctx).await,
        Commands::Status(args) => status::run(args, &ctx).await,
        Commands::Kv(args) => kv::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}

/// Console (human-readable, stderr) plus daily-rolling JSON file logging.
///
/// `RUST_LOG` replaces the console filter when set. The returned guard must
/// live until exit so buffered file output is flushed.
fn init_tracing(
    verbose: bool,
    logging: &LoggingConfig,
    config_dir: Option<&Path>,
) -> Option<WorkerGuard> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let level = if verbose { "debug" } else { logging.level.as_str() };
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives(level, "warn")));

    let log_dir = logging
        .dir
        .clone()
        .or_else(|| config_dir.map(|d| d.join("logs")));

    let (file_layer, guard) = match log_dir {
        Some(dir) if logging.file => {
            let file_appender = tracing_appender::rolling::daily(dir, "stash.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(directives("trace", "info")));
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(file_layer)
        .init();

    guard
}

/// `stash=<level>,stash_kv=<level>,...,<fallback>`
fn directives(level: &str, fallback: &str) -> String {
    let mut directives: Vec<String> = LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect();
    directives.push(fallback.to_string());
    directives.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_directives_cover_every_crate() {
        let filter = directives("debug", "warn");
        assert!(filter.starts_with("stash=debug,"));
        assert!(filter.contains("stash_server=debug"));
        assert!(filter.ends_with(",warn"));
    }
}
