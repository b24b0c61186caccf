//! Status command
//!
//! One batched fetch for all requested services, printed per step.

use anyhow::Result;
use colored::*;
use keel_core::domain::pipeline::{PipelineStep, StepStatus, latest_step};
use keel_core::domain::service::StepName;

use crate::config::Config;

pub async fn show_status(config: &Config, service_ids: &[i64]) -> Result<()> {
    let client = config.client()?;
    let statuses = client.fetch_pipeline_statuses(service_ids).await?;

    for service_id in service_ids {
        println!("{} {}", "▸".cyan(), format!("Service {}", service_id).bold());

        let steps = statuses.get(service_id).map(Vec::as_slice).unwrap_or_default();
        if steps.is_empty() {
            println!("    {}", "No pipeline steps reported.".yellow());
            println!();
            continue;
        }

        for name in StepName::ALL {
            if let Some(step) = latest_step(steps, name) {
                print_step(step);
            }
        }
        println!();
    }

    Ok(())
}

fn print_step(step: &PipelineStep) {
    let progress = step
        .progress_percent
        .map(|p| format!(" {}%", p))
        .unwrap_or_default();

    println!(
        "    {:<8} {}{} {}",
        step.step_name.to_string(),
        colored_status(step.status),
        progress,
        format!("({})", step.raw_status).dimmed()
    );

    if let Some(completed) = step.completed_at {
        println!(
            "             finished {}",
            completed.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
    if let Some(error) = &step.error_message {
        println!("             {}", error.red());
    }
}

pub(super) fn colored_status(status: StepStatus) -> ColoredString {
    match status {
        StepStatus::Pending => status.to_string().yellow(),
        StepStatus::Running => status.to_string().cyan(),
        StepStatus::Success => status.to_string().green(),
        StepStatus::Failed => status.to_string().red(),
    }
}
