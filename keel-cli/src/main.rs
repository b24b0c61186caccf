//! Keel CLI
//!
//! Command-line front end for the pipeline execution controller.

mod commands;
mod config;
mod input;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "keel")]
#[command(about = "Keel pipeline execution and security-gate controller", long_about = None)]
struct Cli {
    /// Pipeline backend URL
    #[arg(long, env = "KEEL_API_URL", default_value = "http://localhost:8080")]
    api_url: String,

    /// Credentials file (git, servers, registries)
    #[arg(long, env = "KEEL_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Seconds between status polls
    #[arg(long, env = "KEEL_POLL_INTERVAL", default_value = "5")]
    poll_interval: u64,

    /// Idle ticks before polling stops
    #[arg(long, env = "KEEL_GRACE_TICKS", default_value = "6")]
    grace_ticks: u32,

    /// Per-request timeout in seconds
    #[arg(long, env = "KEEL_REQUEST_TIMEOUT", default_value = "30")]
    request_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keel_cli=info,keel_controller=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = Config::from_args(
        cli.api_url,
        cli.credentials,
        cli.poll_interval,
        cli.grace_ticks,
        cli.request_timeout,
    )?;

    handle_command(cli.command, &config).await
}
