// src/cli/handlers/render.rs

use anyhow::{Context, Result, anyhow};
use colored::*;
use std::path::Path;

use crate::cli::Cli;
use crate::cli::handlers::{display_path, open_session};
use crate::core::template_source::FsTemplateSource;
use crate::system::blob::FsBlobStore;
use crate::system::secrets::BlobSecretStore;

/// Renders one service's template and prints the result to stdout.
pub async fn handle(
    cli: &Cli,
    service: &str,
    datacenter: Option<u32>,
    secrets: &Path,
    templates: &Path,
) -> Result<()> {
    let session = open_session(cli)?;
    let env = session
        .current_environment()
        .ok_or_else(|| anyhow!("No environment selected. Use --environment or set NUOPS_CURRENT_ENVIRONMENT."))?;

    let datacenter_id = match datacenter {
        Some(id) => id,
        None => env
            .datacenters
            .first()
            .map(|dc| dc.id)
            .ok_or_else(|| anyhow!("Environment '{}' has no datacenters.", env.name))?,
    };

    let store = BlobSecretStore::new(FsBlobStore::new(secrets));
    let source = FsTemplateSource::new(templates);

    let rendered = session
        .generate_config(&store, &source, datacenter_id, service)
        .await
        .with_context(|| format!("Could not render the configuration of '{}'", service))?;

    match rendered {
        Some(text) => print!("{text}"),
        None => eprintln!(
            "{} no template for '{}' under '{}'",
            "Skipped:".yellow().bold(),
            service,
            display_path(templates)
        ),
    }
    Ok(())
}
