// src/system/blob.rs

use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Blob '{name}' does not exist.")]
    NotFound { name: String },
    #[error("Blob name '{name}' is not a valid relative path.")]
    InvalidName { name: String },
    #[error("Blob I/O error on '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Blob worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Opaque key/value byte store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn load(&self, name: &str) -> Result<Vec<u8>, BlobError>;
    async fn write(&self, name: &str, bytes: &[u8]) -> Result<(), BlobError>;
    async fn exists(&self, name: &str) -> Result<bool, BlobError>;
}

/// A [`BlobStore`] backed by a directory. Blob names are `/`-separated relative paths.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(name);
        let is_plain = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(BlobError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn load(&self, name: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::NotFound {
                name: name.to_string(),
            }),
            Err(source) => Err(BlobError::Io {
                name: name.to_string(),
                source,
            }),
        }
    }

    /// Writes go to a temp file in the target directory first, then are renamed into place.
    async fn write(&self, name: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let path = self.path_for(name)?;
        let owned_name = name.to_string();
        let bytes = bytes.to_vec();

        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await?
            .map_err(|source| BlobError::Io {
                name: owned_name,
                source,
            })
    }

    async fn exists(&self, name: &str) -> Result<bool, BlobError> {
        let path = self.path_for(name)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|source| BlobError::Io {
                name: name.to_string(),
                source,
            })
    }
}

/// Replaces `path` with `bytes` via a sibling temp file, creating parent directories as needed.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "path has no parent"))?;
    std::fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
