//! Check command
//!
//! Runnability of a stage plus the credentials a submission would still ask for.

use anyhow::Result;
use colored::*;
use keel_core::domain::service::{Infrastructure, Service, ServiceLink, Stage};
use keel_controller::Resolution;
use std::path::Path;

use crate::config::Config;
use crate::input::read_json;

pub fn check_stage(
    config: &Config,
    service_path: &Path,
    stage: Stage,
    links_path: Option<&Path>,
    infra_path: Option<&Path>,
) -> Result<()> {
    let service: Service = read_json(service_path)?;
    let links: Vec<ServiceLink> = match links_path {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    let infra = infra_path.map(read_json::<Infrastructure>).transpose()?;

    let controller = config.controller()?;
    let verdict = controller.is_runnable(&service, stage, &links);

    println!("{} {} {}", "▸".cyan(), service.name.bold(), stage.to_string().dimmed());
    if verdict.runnable {
        println!("  Runnable:    {}", "yes".green());
    } else {
        println!("  Runnable:    {}", "no".red());
        if let Some(reason) = &verdict.reason {
            println!("  Reason:      {}", reason.yellow());
        }
    }

    match controller.resolver().resolve(&service, stage, infra.as_ref()) {
        Resolution::Complete(credentials) => {
            println!("  Credentials: {}", "complete".green());
            if !credentials.ssh_hops.is_empty() {
                println!(
                    "  Hops:        {}",
                    credentials
                        .ssh_hops
                        .iter()
                        .map(|hop| format!("{}@{}:{}", hop.username, hop.host, hop.port))
                        .collect::<Vec<_>>()
                        .join(" -> ")
                        .dimmed()
                );
            }
        }
        Resolution::Partial(partial) => {
            println!("  Credentials: {}", "incomplete".yellow());
            for missing in &partial.missing {
                println!("    - {}", missing.to_string().red());
            }
        }
    }

    if stage != Stage::Source && infra.is_none() {
        println!(
            "  {}",
            "Pass --infra to check SSH hop credentials as well.".dimmed()
        );
    }

    Ok(())
}
