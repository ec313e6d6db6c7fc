mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use memri::config::MemriConfig;

#[derive(Parser)]
#[command(name = "memri", version, about = "Screen memory: capture, OCR, search, and an assistant API")]
struct Cli {
    /// Config file (default: first of memri-config.toml, memri.config.toml, config/memri-config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the capture loops and the HTTP API
    Serve {
        /// Serve stored data without capturing the screen
        #[arg(long)]
        no_capture: bool,
    },
    /// List monitors visible to the capture backend
    Monitors,
    /// Search captured text
    Search {
        query: String,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show storage statistics and database health
    Stats,
    /// Apply the retention policy once
    Prune,
    /// Seed an empty database from a folder of screenshots
    Seed { dir: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = MemriConfig::load(cli.config.as_deref())?;

    // stdout is reserved for command output
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    config.log_source();

    match cli.command {
        Command::Serve { no_capture } => cli::serve::serve(config, no_capture).await?,
        Command::Monitors => cli::monitors::monitors().await?,
        Command::Search { query, limit } => cli::search::search(&config, &query, limit)?,
        Command::Stats => cli::stats::stats(&config)?,
        Command::Prune => cli::maintenance::prune(&config).await?,
        Command::Seed { dir } => cli::maintenance::seed(&config, &dir).await?,
    }

    Ok(())
}
