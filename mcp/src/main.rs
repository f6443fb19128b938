//! eventdesk MCP server binary
//!
//! ## Usage
//!
//! ```bash
//! # Serve the configured Dataverse environment over stdio
//! eventdesk-mcp
//!
//! # Serve an in-memory organization
//! eventdesk-mcp --offline
//! ```

use anyhow::Result;
use clap::Parser;
use eventdesk_core::ConfigLoader;
use rmcp::{transport::stdio, ServiceExt};
use std::path::PathBuf;
use tracing::info;

/// eventdesk-mcp - Dataverse tools over the Model Context Protocol
#[derive(Parser)]
#[command(name = "eventdesk-mcp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Serve the eventdesk Dataverse tools over MCP stdio")]
struct Args {
    /// Configuration file or directory path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use an in-memory CRM instead of Dataverse
    #[arg(long)]
    offline: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries the protocol, so logs go to stderr without colors
    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let mut loader = ConfigLoader::new();
    if let Some(path) = args.config {
        loader = loader.with_config_override(path);
    }
    let config = loader.load().await?;

    let server = eventdesk_mcp::build_server(&config, args.offline)?;
    info!("Starting eventdesk MCP server on stdio");

    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    info!("MCP server shutdown complete");
    Ok(())
}
