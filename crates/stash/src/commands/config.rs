//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use serde::Serialize;

use stash_config::{KvConfig, LoggingConfig, ServerConfig, SessionConfig, StashConfig};

use super::Context;

/// Project-local config file created by `config init --local`.
const PROJECT_CONFIG_FILE: &str = "stash.toml";

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./stash.toml) instead of user config
        #[arg(long)]
        local: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show configuration file path
    Path,
}

/// Fully resolved configuration for display. The secret is never printed.
#[derive(Debug, Serialize)]
struct ResolvedConfig {
    sources: Vec<PathBuf>,
    server: ServerConfig,
    kv: KvConfig,
    session: SessionConfig,
    logging: LoggingConfig,
}

impl ResolvedConfig {
    fn new(ctx: &Context) -> Self {
        let config = ctx.config();
        let mut session = config.session();
        if session.secret.is_some() {
            session.secret = Some("<redacted>".to_string());
        }
        Self {
            sources: ctx
                .loaded
                .loaded_from()
                .into_iter()
                .map(|p| p.to_path_buf())
                .collect(),
            server: config.server(),
            kv: config.kv(),
            session,
            logging: config.logging(),
        }
    }
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Init { local, force } => cmd_init(ctx, local, force),
        ConfigCommand::Path => cmd_path(ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let resolved = ResolvedConfig::new(ctx);

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
        return Ok(());
    }

    println!("# Stash Configuration\n");

    if resolved.sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &resolved.sources {
            println!("  {}", source.display());
        }
        println!();
    }

    println!("Server:");
    println!("  bind: {}:{}", resolved.server.bind, resolved.server.port);
    println!("  request logging: {}", resolved.server.request_logging);
    println!();

    let kv = &resolved.kv;
    println!("Key-value:");
    match kv.port {
        Some(port) => println!("  transport: {}:{}", kv.bind, port),
        None => println!("  transport: {}:<any free port>", kv.bind),
    }
    println!("  bucket: {} ({})", kv.bucket, kv.description);
    if kv.ttl_secs == 0 {
        println!("  ttl: none");
    } else {
        println!("  ttl: {}s", kv.ttl_secs);
    }
    println!("  max bytes: {}", kv.max_bytes);
    println!("  compression: {}", kv.compression);
    println!();

    let session = &resolved.session;
    println!("Session:");
    println!("  cookie: {} (field '{}')", session.cookie_name, session.id_field);
    println!(
        "  secret: {}",
        if session.secret.is_some() { "set" } else { "generated per process" }
    );
    println!();

    if !ctx.loaded.warnings.is_empty() {
        println!("Warnings:");
        for w in &ctx.loaded.warnings {
            println!("  ⚠ {}", w);
        }
        println!();
    }

    if ctx.verbose {
        println!("---\nRaw config:\n");
        if let Ok(toml_str) = ctx.config().to_toml() {
            println!("{}", toml_str);
        }
    }

    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    println!("Config file search order (later overrides earlier):\n");

    for source in &ctx.loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    println!("Environment overrides: STASH_KV_PORT, STASH_SESSION_SECRET");
    Ok(())
}

fn cmd_init(ctx: &Context, local: bool, force: bool) -> Result<()> {
    let path = if local {
        PathBuf::from(PROJECT_CONFIG_FILE)
    } else {
        user_config_file(ctx)?
    };

    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let mut config = StashConfig::new();
    config.server = Some(ServerConfig::default());
    config.kv = Some(KvConfig::default());
    config.session = Some(SessionConfig::default());
    config.logging = Some(LoggingConfig::default());
    stash_config::save_config(&config, &path)?;

    println!("Created {}", path.display());
    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    println!("{}", user_config_file(ctx)?.display());
    Ok(())
}

fn user_config_file(ctx: &Context) -> Result<PathBuf> {
    match &ctx.config_dir {
        Some(dir) => Ok(dir.join("config.toml")),
        None => bail!("could not determine the user config directory; pass --config-dir"),
    }
}
