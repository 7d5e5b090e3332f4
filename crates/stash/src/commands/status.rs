//! Status command - shows whether the server and transport are up.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use super::Context;

/// Arguments for the status command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Also show the session bucket's status
    #[arg(short, long)]
    pub detailed: bool,
}

/// Status response for JSON output.
#[derive(Debug, Serialize)]
struct StatusOutput {
    server_url: String,
    server_running: bool,
    kv_url: Option<String>,
    kv_running: bool,
}

/// Run the status command.
pub async fn run(args: StatusArgs, ctx: &Context) -> Result<()> {
    let server = ctx.config().server();
    let server_url = super::http_url(&server.bind, server.port);
    let server_running = check_health(&server_url).await;

    let kv_client = ctx.kv_client().ok();
    let kv_url = kv_client.as_ref().map(|c| c.base_url().to_string());
    let kv_running = match &kv_client {
        Some(client) => client.is_healthy().await,
        None => false,
    };

    if ctx.json_output {
        let output = StatusOutput {
            server_url,
            server_running,
            kv_url,
            kv_running,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!();
    println!("{}", style("Stash Status").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!(
        "  {} {} {}",
        dim.apply_to("Server:   "),
        indicator(server_running),
        server_url
    );
    println!(
        "  {} {} {}",
        dim.apply_to("Transport:"),
        indicator(kv_running),
        kv_url.as_deref().unwrap_or("unknown")
    );

    if args.detailed
        && kv_running
        && let Some(client) = &kv_client
    {
        let bucket = ctx.config().kv().bucket;
        match client.status(&bucket).await {
            Ok(status) => {
                println!();
                println!(
                    "  {} {} values, {} / {} bytes",
                    dim.apply_to(format!("Bucket {}:", status.bucket)),
                    status.values,
                    status.bytes,
                    status.max_bytes
                );
            }
            Err(e) if ctx.verbose => {
                println!();
                println!("  {} {}", dim.apply_to("Error:"), e);
            }
            Err(_) => {}
        }
    }

    if !server_running {
        println!();
        println!("  {}", dim.apply_to("Start the server with: stash start"));
    }
    println!();

    Ok(())
}

fn indicator(running: bool) -> console::StyledObject<&'static str> {
    if running {
        style("● running").green()
    } else {
        style("● not running").red()
    }
}

async fn check_health(base_url: &str) -> bool {
    let Ok(client) = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    else {
        return false;
    };
    client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .is_ok_and(|r| r.status().is_success())
}
