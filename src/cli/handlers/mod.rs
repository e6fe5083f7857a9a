// src/cli/handlers/mod.rs

pub mod environments;
pub mod render;
pub mod token;

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::Cli;
use crate::core::session::{OpsSession, SessionConfig};

/// Loads the session for a command, applying the global CLI overrides.
pub(crate) fn open_session(cli: &Cli) -> Result<OpsSession> {
    let mut config = SessionConfig::from_env().context("Could not read the session settings")?;
    config.token_store_root = cli.token_store.clone().or(config.token_store_root);

    let mut session = OpsSession::load(config).context("Could not load the app model")?;
    if let Some(name) = cli.environment.as_deref() {
        session.set_current_environment(name, true)?;
    }
    Ok(session)
}

pub(crate) fn display_path(path: &Path) -> String {
    dunce::simplified(path).display().to_string()
}
