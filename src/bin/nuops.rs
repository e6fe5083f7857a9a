// src/bin/nuops.rs

use anyhow::Result;
use clap::Parser;
use colored::*;
use nuops::cli::{Cli, Command, handlers};

/// Sets up logging, parses arguments, dispatches to the handler and reports errors.
#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = run_cli(Cli::parse()).await {
        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run_cli(cli: Cli) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    match &cli.command {
        Command::Environments => handlers::environments::handle(&cli),
        Command::Render {
            service,
            datacenter,
            secrets,
            templates,
        } => handlers::render::handle(&cli, service, *datacenter, secrets, templates).await,
        Command::Token { tenant, cached } => handlers::token::handle(&cli, tenant.as_deref(), *cached).await,
    }
}
