//! Key-value commands - talk to a running transport.

use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use clap::{Args, Subcommand};
use console::{Style, style};
use futures::StreamExt;
use serde::Serialize;
use stash_kv::{BucketStatus, Entry};

use super::Context;

/// Arguments for the kv command.
#[derive(Args, Debug)]
pub struct KvArgs {
    /// Bucket to operate on (default: the configured session bucket)
    #[arg(short, long, global = true)]
    pub bucket: Option<String>,

    #[command(subcommand)]
    pub command: KvCommand,
}

#[derive(Subcommand, Debug)]
pub enum KvCommand {
    /// Print the value for a key
    Get {
        /// Key to read
        key: String,
    },

    /// Write a value (from the argument, --file, or stdin)
    Put {
        /// Key to write
        key: String,

        /// Value to store
        value: Option<String>,

        /// Read the value from a file
        #[arg(long, conflicts_with = "value")]
        file: Option<PathBuf>,
    },

    /// Delete a key
    Delete {
        /// Key to delete
        key: String,
    },

    /// Stream changes to a key until interrupted
    Watch {
        /// Key to watch
        key: String,
    },

    /// Show bucket status
    Status,
}

/// Entry for JSON output.
#[derive(Debug, Serialize)]
struct EntryOutput<'a> {
    bucket: &'a str,
    key: &'a str,
    revision: u64,
    created: String,
    operation: &'static str,
    /// Base64-encoded value.
    value: String,
}

impl<'a> From<&'a Entry> for EntryOutput<'a> {
    fn from(entry: &'a Entry) -> Self {
        Self {
            bucket: &entry.bucket,
            key: &entry.key,
            revision: entry.revision,
            created: entry.created.to_rfc3339(),
            operation: entry.operation.as_str(),
            value: STANDARD.encode(&entry.value),
        }
    }
}

/// Run the kv command.
pub async fn run(args: KvArgs, ctx: &Context) -> Result<()> {
    let client = ctx.kv_client()?;
    let bucket = args.bucket.unwrap_or_else(|| ctx.config().kv().bucket);

    match args.command {
        KvCommand::Get { key } => {
            let entry = client.get(&bucket, &key).await?;
            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&EntryOutput::from(&entry))?);
            } else {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(&entry.value)?;
                stdout.flush()?;
            }
        }
        KvCommand::Put { key, value, file } => {
            let value = read_value(value, file)?;
            let revision = client.put(&bucket, &key, value).await?;
            if ctx.json_output {
                println!("{}", serde_json::json!({ "revision": revision }));
            } else {
                println!("{} {} @ {}", style("✓").green(), key, revision);
            }
        }
        KvCommand::Delete { key } => {
            let revision = client.delete(&bucket, &key).await?;
            if ctx.json_output {
                println!("{}", serde_json::json!({ "revision": revision }));
            } else {
                println!("{} deleted {} @ {}", style("✓").green(), key, revision);
            }
        }
        KvCommand::Watch { key } => watch(&client, &bucket, &key, ctx).await?,
        KvCommand::Status => {
            let status = client.status(&bucket).await?;
            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
    }

    Ok(())
}

async fn watch(client: &stash_client::KvClient, bucket: &str, key: &str, ctx: &Context) -> Result<()> {
    let stream = client.watch(bucket, key).await?;
    tokio::pin!(stream);

    let dim = Style::new().dim();
    loop {
        let next = tokio::select! {
            next = stream.next() => next,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(entry) = next else { break };
        let entry = entry?;

        if ctx.json_output {
            println!("{}", serde_json::to_string(&EntryOutput::from(&entry))?);
        } else {
            println!(
                "{} {} {}",
                dim.apply_to(format!("#{}", entry.revision)),
                style(entry.operation.as_str()).cyan(),
                String::from_utf8_lossy(&entry.value)
            );
        }
    }

    Ok(())
}

fn read_value(value: Option<String>, file: Option<PathBuf>) -> Result<Bytes> {
    if let Some(value) = value {
        return Ok(Bytes::from(value));
    }
    if let Some(path) = file {
        let data = std::fs::read(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        return Ok(Bytes::from(data));
    }
    let mut data = Vec::new();
    std::io::stdin()
        .read_to_end(&mut data)
        .context("failed to read value from stdin")?;
    Ok(Bytes::from(data))
}

fn print_status(status: &BucketStatus) {
    let dim = Style::new().dim();

    println!();
    println!("{}", style(format!("Bucket {}", status.bucket)).bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!("  {} {}", dim.apply_to("Description:"), status.description);
    println!("  {} {}", dim.apply_to("Values:     "), status.values);
    println!(
        "  {} {} / {}",
        dim.apply_to("Bytes:      "),
        status.bytes,
        status.max_bytes
    );
    let ttl = status
        .ttl
        .map(|ttl| format!("{}s", ttl.as_secs()))
        .unwrap_or_else(|| "none".to_string());
    println!("  {} {}", dim.apply_to("TTL:        "), ttl);
    println!("  {} {}", dim.apply_to("Compression:"), status.compression);
    println!();
}
