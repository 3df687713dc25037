mod cli;
mod config;
mod crypto;
mod db;
mod dlp;
mod embedding;
mod error;
mod indexing;
mod keys;
mod keyvault;
mod memory;
mod recovery;
mod secrets;
mod server;
mod sync;
mod tools;
mod watcher;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "engram",
    version,
    about = "Encrypted memory and secrets MCP server for AI assistants"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (stdio transport)
    Serve,
    /// Check database health and print a report
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::EngramConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => {
            server::serve_stdio(config).await?;
        }
        Command::Doctor => {
            cli::doctor::run(&config)?;
        }
    }

    Ok(())
}
