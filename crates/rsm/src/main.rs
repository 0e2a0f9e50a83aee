//! rsm - operator tool for persisted web sessions
//!
//! Main entry point for the rsm CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{config, delete, hash, inspect};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// rsm - inspect and manage sessions persisted in a TTL key-value store
#[derive(Parser)]
#[command(name = "rsm")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Directory holding config.toml (default: $RSM_CONFIG_DIR or the platform config dir)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Storage URL, overriding [storage].url
    #[arg(long, global = true, env = "RSM_REDIS_URL")]
    pub url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch and decode a stored session
    Inspect(inspect::InspectArgs),

    /// Delete a stored session
    Delete(delete::DeleteArgs),

    /// Compute the attribute hash of a JSON object
    Hash(hash::HashArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_dir = cli.config_dir.clone().or_else(rsm_config::config_dir);

    // Initialize tracing: console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "rsm=debug,rsm_session=debug,rsm_storage=debug,rsm_codec=debug,rsm_config=debug,info"
    } else {
        "rsm=info,rsm_session=info,rsm_storage=info,warn"
    };

    let log_dir = config_dir
        .as_ref()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "rsm.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "rsm=trace,rsm_session=trace,rsm_storage=trace,rsm_codec=trace,rsm_config=trace,info",
                )),
        )
        .init();

    let loaded = rsm_config::load_config_with_options(None, cli.config_dir.as_deref())?;
    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    // Create context for commands
    let ctx = commands::Context {
        config: loaded,
        config_dir,
        url: cli.url,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Inspect(args) => inspect::run(args, &ctx).await,
        Commands::Delete(args) => delete::run(args, &ctx).await,
        Commands::Hash(args) => hash::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
