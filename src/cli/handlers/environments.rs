// src/cli/handlers/environments.rs

use anyhow::Result;
use colored::*;

use crate::cli::Cli;
use crate::cli::handlers::{display_path, open_session};

/// Prints the app model as a tree, marking the current environment.
pub fn handle(cli: &Cli) -> Result<()> {
    let session = open_session(cli)?;
    let model = session.app_model();
    let current = session.current_environment().map(|env| env.name.as_str());

    println!("\n--- {} '{}' ---", "App model".bold(), display_path(session.model_path()).yellow());

    if model.environments.is_empty() {
        println!("  {}", "(no environments)".dimmed());
        return Ok(());
    }

    for env in &model.environments {
        let marker = if Some(env.name.as_str()) == current { "*".green().bold() } else { " ".normal() };
        let tenant = env.tenant().unwrap_or("-");
        println!("{} {} {}", marker, env.name.cyan().bold(), format!("(tenant: {tenant})").dimmed());

        for dc in &env.datacenters {
            let region = dc.region.as_deref().unwrap_or("-");
            println!("    {} {} {}", "datacenter".blue(), dc.id, format!("[{region}]").dimmed());
            for service in &dc.services {
                println!("      {:<24} {:<16} {}", service.name, service.kind.dimmed(), service.uri);
            }
            if !dc.resources.is_empty() {
                println!("      {} {}", "resources:".blue(), dc.resources.len());
            }
        }
    }
    Ok(())
}
