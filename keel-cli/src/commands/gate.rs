//! Gate command

use anyhow::{Result, bail};
use colored::*;
use keel_core::domain::service::{Service, Stage};
use keel_controller::{GateDecision, GateWarning};
use std::path::Path;

use crate::config::Config;
use crate::input::{read_json, selection};

pub async fn show_gate(
    config: &Config,
    service_path: &Path,
    stage: Stage,
    image: Option<String>,
    map: Vec<(String, String)>,
) -> Result<()> {
    if !stage.is_gated() {
        bail!("Stage '{}' has no security gate", stage);
    }

    let service: Service = read_json(service_path)?;
    let selection = selection(image, map)?;

    let controller = config.controller()?;
    let decision = controller.evaluate_gate(&service, stage, &selection).await;

    match &decision {
        GateDecision::Clear => println!("{}", "✓ Security gate clear".green().bold()),
        GateDecision::Warn(warning) => print_warning(warning),
        GateDecision::Blocked(reason) => {
            println!("{} {}", "✗ Security gate blocked:".red().bold(), reason)
        }
    }

    Ok(())
}

pub(super) fn print_warning(warning: &GateWarning) {
    println!(
        "{} {}",
        "! Security gate warning:".yellow().bold(),
        warning.reason.to_string().yellow()
    );
    println!(
        "  Critical: {}  High: {}  Medium: {}  Low: {}",
        warning.summary.critical.to_string().red(),
        warning.summary.high,
        warning.summary.medium,
        warning.summary.low
    );
    if !warning.unanalyzed.is_empty() {
        println!(
            "  Not analyzed: {}",
            warning.unanalyzed.join(", ").dimmed()
        );
    }
}
