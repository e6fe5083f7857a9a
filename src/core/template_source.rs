// src/core/template_source.rs

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

use crate::constants::TEMPLATE_SUFFIX;
use crate::models::Service;
use crate::system::blob::{BlobError, BlobStore};

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Could not read template '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not load template blob: {0}")]
    Blob(#[from] BlobError),
    #[error("Template '{name}' is not valid UTF-8.")]
    NotUtf8 { name: String },
}

/// `<fullName>.cscfg.template`
pub fn template_name(service: &Service) -> String {
    format!("{}{}", service.full_name(), TEMPLATE_SUFFIX)
}

/// Locates the unrendered template text for a service. `Ok(None)` means "nothing to render".
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn read_template(&self, service: &Service) -> Result<Option<String>, TemplateError>;
}

/// Templates stored as files directly under a root directory.
#[derive(Debug, Clone)]
pub struct FsTemplateSource {
    root: PathBuf,
}

impl FsTemplateSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, service: &Service) -> PathBuf {
        self.root.join(template_name(service))
    }
}

#[async_trait]
impl TemplateSource for FsTemplateSource {
    async fn read_template(&self, service: &Service) -> Result<Option<String>, TemplateError> {
        let path = self.path_for(service);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("No template at '{}'", path.display());
                Ok(None)
            }
            Err(source) => Err(TemplateError::Io { path, source }),
        }
    }
}

/// Templates stored in a [`BlobStore`] under an optional prefix.
#[derive(Debug)]
pub struct BlobTemplateSource<B> {
    blobs: B,
    prefix: String,
}

impl<B: BlobStore> BlobTemplateSource<B> {
    pub fn new(blobs: B, prefix: impl Into<String>) -> Self {
        Self {
            blobs,
            prefix: prefix.into(),
        }
    }

    fn blob_name(&self, service: &Service) -> String {
        let prefix = self.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            template_name(service)
        } else {
            format!("{}/{}", prefix, template_name(service))
        }
    }
}

#[async_trait]
impl<B: BlobStore> TemplateSource for BlobTemplateSource<B> {
    async fn read_template(&self, service: &Service) -> Result<Option<String>, TemplateError> {
        let name = self.blob_name(service);
        let bytes = match self.blobs.load(&name).await {
            Ok(bytes) => bytes,
            Err(BlobError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| TemplateError::NotUtf8 { name })
    }
}
