// src/cli/handlers/token.rs

use anyhow::{Result, anyhow};
use colored::*;

use crate::cli::Cli;
use crate::cli::handlers::open_session;

/// Prints the access token for a tenant; metadata goes to stderr so stdout stays pipeable.
pub async fn handle(cli: &Cli, tenant: Option<&str>, cached_only: bool) -> Result<()> {
    let session = open_session(cli)?;
    let tenant = match tenant {
        Some(t) => t.to_string(),
        None => session
            .current_environment()
            .and_then(|env| env.tenant())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("No tenant given and the current environment has no subscription tenant."))?,
    };

    let manager = session.token_manager();
    let token = if cached_only {
        manager.cached(&tenant).await?
    } else {
        manager.token_for(&tenant).await?
    };

    let Some(token) = token else {
        return Err(anyhow!("No token available for tenant '{}'.", tenant));
    };

    eprintln!(
        "{} {} {}",
        "Tenant".blue(),
        tenant.yellow(),
        format!("(expires {})", token.expires_on.to_rfc3339()).dimmed()
    );
    println!("{}", token.access_token);
    Ok(())
}
