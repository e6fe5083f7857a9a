// src/core/paths.rs

use crate::constants::{APP_DATA_DIR, TOKEN_STORE_DIR};
use lazy_static::lazy_static;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

lazy_static! {
    static ref DEFAULT_TOKEN_STORE: Mutex<Option<PathBuf>> = Mutex::new(None);
}

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not find the user's local data directory.")]
    DataDirNotFound,
    #[error("Failed to expand path '{path}': {reason}")]
    Expansion { path: String, reason: String },
}

/// Returns the default token cache root (`<local data dir>/nuops/tokens`).
///
/// This function is memoized: the first call computes and caches the path,
/// subsequent calls return the cached value. The directory is not created here;
/// the token cache creates it on first write.
pub fn default_token_store_root() -> Result<PathBuf, PathError> {
    let mut cached = DEFAULT_TOKEN_STORE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(path) = &*cached {
        return Ok(path.clone());
    }

    let path = dirs::data_local_dir()
        .ok_or(PathError::DataDirNotFound)?
        .join(APP_DATA_DIR)
        .join(TOKEN_STORE_DIR);

    *cached = Some(path.clone());
    Ok(path)
}

/// Expands `~` and environment variables (`$VAR`, `${VAR}`) in a user-supplied path.
pub fn expand_path(raw: &str) -> Result<PathBuf, PathError> {
    let expanded = shellexpand::full(raw.trim()).map_err(|e| PathError::Expansion {
        path: raw.to_string(),
        reason: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.into_owned()))
}
