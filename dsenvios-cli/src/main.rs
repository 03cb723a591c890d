//! dsenvios CLI - shipment tracking backend
//!
//! - `serve`: HTTP API for the guide form, tracking page and admin panel
//! - `migrate`: create tables (idempotent)
//! - `create`, `transition`, `track`, `guides`: guide operations from a shell
//! - `config`: inspect the effective configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dsenvios_core::AppConfig;

mod commands;
mod tracing_setup;

#[derive(Parser, Debug)]
#[command(
    name = "dsenvios",
    author,
    version,
    about = "Shipment registry and tracking backend",
    long_about = "Serve the DsEnvios API and operate on guides directly against the database. \
                  Configuration comes from ~/.dsenvios/config.toml, DB_* environment variables \
                  (a .env file is honoured) and command-line flags, in increasing precedence."
)]
struct Cli {
    /// Config file (default: ~/.dsenvios/config.toml when present)
    #[arg(long, short = 'c', global = true, env = "DSENVIOS_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging unless RUST_LOG is set
    #[arg(long, global = true)]
    debug: bool,

    /// Export traces over OTLP (requires the telemetry feature)
    #[arg(long, global = true)]
    otel: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API server
    Serve(commands::serve::ServeArgs),
    /// Create or update the database schema
    Migrate,
    /// Register a new guide in the pending state
    Create(commands::guides::CreateArgs),
    /// Move a guide to a new status
    Transition(commands::guides::TransitionArgs),
    /// Show a guide's tracking projection
    Track(commands::guides::TrackArgs),
    /// List guides with filters, sorting and pagination
    Guides(commands::guides::ListArgs),
    /// Inspect configuration (show, path)
    Config(commands::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    tracing_setup::init(&tracing_setup::TracingConfig {
        debug: cli.debug,
        otel: cli.otel,
    })
    .ok();

    let result = run(cli).await;
    tracing_setup::shutdown_otel();
    result
}

async fn run(cli: Cli) -> Result<()> {
    // `config path` must work even when the file is broken.
    if let Commands::Config(args) = &cli.command {
        return commands::config::run_config(args, cli.config.as_deref());
    }

    let config = AppConfig::load(cli.config.as_deref())?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Serve(args) => commands::run_serve(args, config).await,
        Commands::Migrate => commands::run_migrate(&config).await,
        Commands::Create(args) => commands::guides::run_create(args, &config).await,
        Commands::Transition(args) => commands::guides::run_transition(args, &config).await,
        Commands::Track(args) => commands::guides::run_track(args, &config).await,
        Commands::Guides(args) => commands::guides::run_list(args, &config).await,
        Commands::Config(_) => Ok(()),
    }
}
