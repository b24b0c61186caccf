//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod check;
mod gate;
mod run;
mod status;

use anyhow::Result;
use clap::Subcommand;
use keel_core::domain::service::Stage;
use std::path::PathBuf;

use crate::config::Config;
use crate::input::parse_key_val;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Show the latest pipeline steps of one or more services
    Status {
        /// Service IDs, fetched in a single batched call
        #[arg(required = true)]
        service_ids: Vec<i64>,
    },
    /// Check whether a stage can run and which credentials it still needs
    Check {
        /// Service JSON file
        service: PathBuf,

        /// Stage (source, build, deploy, operate)
        stage: Stage,

        /// Service-link list JSON file
        #[arg(long)]
        links: Option<PathBuf>,

        /// Target infrastructure JSON file
        #[arg(long)]
        infra: Option<PathBuf>,
    },
    /// Evaluate the security gate guarding a stage
    Gate {
        /// Service JSON file
        service: PathBuf,

        /// Stage (build or deploy)
        stage: Stage,

        /// Image tag to deploy, or source commit to check for build
        #[arg(long)]
        image: Option<String>,

        /// Per-subservice image tags (e.g., api=v1.2.0)
        #[arg(long, value_parser = parse_key_val)]
        map: Vec<(String, String)>,
    },
    /// Submit a stage for execution and wait for it to finish
    Run {
        /// Service JSON file
        service: PathBuf,

        /// Stage (build or deploy)
        stage: Stage,

        /// Target infrastructure JSON file
        #[arg(long)]
        infra: PathBuf,

        /// Service-link list JSON file
        #[arg(long)]
        links: Option<PathBuf>,

        /// Single image tag to deploy
        #[arg(long)]
        image: Option<String>,

        /// Per-subservice image tags (e.g., api=v1.2.0)
        #[arg(long, value_parser = parse_key_val)]
        map: Vec<(String, String)>,

        /// Subservices to build (comma-separated)
        #[arg(long, value_delimiter = ',')]
        services: Vec<String>,

        /// Deploy automatically after the build succeeds
        #[arg(long)]
        auto_deploy: bool,

        /// Proceed past security gate warnings
        #[arg(short, long)]
        yes: bool,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Status { service_ids } => status::show_status(config, &service_ids).await,
        Commands::Check {
            service,
            stage,
            links,
            infra,
        } => check::check_stage(config, &service, stage, links.as_deref(), infra.as_deref()),
        Commands::Gate {
            service,
            stage,
            image,
            map,
        } => gate::show_gate(config, &service, stage, image, map).await,
        Commands::Run {
            service,
            stage,
            infra,
            links,
            image,
            map,
            services,
            auto_deploy,
            yes,
        } => {
            run::run_stage(
                config,
                run::RunArgs {
                    service,
                    stage,
                    infra,
                    links,
                    image,
                    map,
                    services,
                    auto_deploy,
                    yes,
                },
            )
            .await
        }
    }
}
