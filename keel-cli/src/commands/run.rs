//! Run command
//!
//! Submits a stage, confirms the security gate when `--yes` is given, then
//! follows the poller until the tracked execution finishes.

use anyhow::{Result, bail};
use colored::*;
use keel_core::domain::pipeline::FinishedExecution;
use keel_core::domain::service::{Infrastructure, Service, ServiceLink, Stage};
use keel_controller::{ExecutionController, SubmissionError, SubmitOptions};
use std::path::PathBuf;
use tokio::sync::oneshot;
use tokio::time;
use tracing::debug;

use super::gate::print_warning;
use super::status::colored_status;
use crate::config::Config;
use crate::input::{read_json, selection};

pub struct RunArgs {
    pub service: PathBuf,
    pub stage: Stage,
    pub infra: PathBuf,
    pub links: Option<PathBuf>,
    pub image: Option<String>,
    pub map: Vec<(String, String)>,
    pub services: Vec<String>,
    pub auto_deploy: bool,
    pub yes: bool,
}

pub async fn run_stage(config: &Config, args: RunArgs) -> Result<()> {
    let service: Service = read_json(&args.service)?;
    let infra: Infrastructure = read_json(&args.infra)?;
    let links: Vec<ServiceLink> = match &args.links {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };

    let options = SubmitOptions {
        links,
        infra: Some(infra),
        selection: selection(args.image, args.map)?,
        selected_services: (!args.services.is_empty()).then_some(args.services),
        auto_deploy: args.auto_deploy,
        confirm_gate: false,
    };

    let controller = config.controller()?;
    let (tx, rx) = oneshot::channel();
    controller.on_execution_finished(move |finished| {
        let _ = tx.send(finished);
    });

    submit(&controller, &service, args.stage, options, args.yes).await?;

    println!(
        "{} {} of {} submitted, waiting for it to finish...",
        "✓".green().bold(),
        args.stage,
        service.name.bold()
    );

    let finished = wait_for_completion(config, &controller, &service, args.stage, rx).await?;
    print_outcome(&finished);

    if !finished.success {
        bail!("{} of {} failed", finished.stage, finished.service_name);
    }
    Ok(())
}

/// Submits once, and once more with the gate confirmed if the user allowed it
async fn submit(
    controller: &ExecutionController,
    service: &Service,
    stage: Stage,
    options: SubmitOptions,
    confirm: bool,
) -> Result<()> {
    let err = match controller.submit(service, stage, options.clone()).await {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };

    match err {
        SubmissionError::GateWarning(warning) => {
            print_warning(&warning);
            if !confirm {
                bail!("Security gate not confirmed; re-run with --yes to proceed");
            }
            println!("{}", "Proceeding past security gate warning.".yellow());

            let confirmed = SubmitOptions {
                confirm_gate: true,
                ..options
            };
            controller
                .submit(service, stage, confirmed)
                .await
                .map_err(report)
        }
        other => Err(report(other)),
    }
}

fn report(err: SubmissionError) -> anyhow::Error {
    match &err {
        SubmissionError::CredentialMissing(missing) => {
            println!("{}", "Credentials needed before this stage can run:".yellow().bold());
            for item in missing {
                println!("  - {}", item.to_string().red());
            }
            println!("{}", "Add them to the credentials file and retry.".dimmed());
        }
        SubmissionError::CredentialInvalid(_) => {
            println!(
                "{}",
                "The backend rejected the supplied credentials; correct them and retry."
                    .yellow()
            );
        }
        _ => {}
    }
    anyhow::Error::new(err)
}

async fn wait_for_completion(
    config: &Config,
    controller: &ExecutionController,
    service: &Service,
    stage: Stage,
    mut rx: oneshot::Receiver<FinishedExecution>,
) -> Result<FinishedExecution> {
    let poller = controller.poller();
    let step_name = stage.step();
    let mut last_seen = None;

    loop {
        tokio::select! {
            finished = &mut rx => {
                return Ok(finished?);
            }
            _ = time::sleep(config.controller.poll_interval) => {
                let latest = step_name.and_then(|name| poller.latest_step(service.id, name));
                if let Some(step) = latest {
                    let current = (step.id, step.status, step.progress_percent);
                    if last_seen != Some(current) {
                        println!(
                            "  {} {}{}",
                            step.step_name,
                            colored_status(step.status),
                            step.progress_percent.map(|p| format!(" {}%", p)).unwrap_or_default()
                        );
                        last_seen = Some(current);
                    }
                }

                if !poller.is_polling() {
                    // The poller may have finished between the two checks
                    if let Ok(finished) = rx.try_recv() {
                        return Ok(finished);
                    }
                    if let Some(error) = poller.last_error() {
                        bail!("Status polling stopped: {}", error);
                    }
                    debug!("Poller went idle without a completion signal");
                    bail!(
                        "{} of {} never reported completion",
                        stage,
                        service.name
                    );
                }
            }
        }
    }
}

fn print_outcome(finished: &FinishedExecution) {
    if finished.success {
        println!(
            "{}",
            format!("✓ {} of {} succeeded", finished.stage, finished.service_name)
                .green()
                .bold()
        );
    } else {
        println!(
            "{}",
            format!("✗ {} of {} failed", finished.stage, finished.service_name)
                .red()
                .bold()
        );
        if let Some(error) = &finished.error_message {
            println!("  {}", error.red());
        }
    }
}
