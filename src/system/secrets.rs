// src/system/secrets.rs

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

use crate::models::{Secret, SecretKind, SecretName};
use crate::system::blob::{BlobError, BlobStore};

#[derive(Error, Debug)]
pub enum SecretStoreError {
    #[error("Secret store I/O failure: {0}")]
    Blob(#[from] BlobError),
    #[error("Secret '{name}' is not valid JSON: {source}")]
    Corrupt {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Could not serialize secret '{name}': {source}")]
    Serialize {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Secret store lock was poisoned.")]
    Poisoned,
}

/// Async lookup/write of secret records. `reason` is an audit note carried with every call.
///
/// A missing secret is `Ok(None)`; `Err` is reserved for genuine store failures.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn read(&self, name: &SecretName, reason: &str) -> Result<Option<Secret>, SecretStoreError>;

    async fn write(&self, secret: &Secret, reason: &str) -> Result<(), SecretStoreError>;

    /// Reads `name`; if it is a `link`, reads the secret it points to (one level only).
    async fn read_link_target(
        &self,
        name: &SecretName,
        reason: &str,
    ) -> Result<Option<Secret>, SecretStoreError> {
        let Some(secret) = self.read(name, reason).await? else {
            return Ok(None);
        };
        if secret.kind != SecretKind::Link {
            return Ok(Some(secret));
        }

        match secret.value.parse::<SecretName>() {
            Ok(target) => {
                log::debug!("Following link '{}' -> '{}'", name, target);
                self.read(&target, reason).await
            }
            Err(e) => {
                log::warn!("Link secret '{}' has an unusable target: {}", name, e);
                Ok(None)
            }
        }
    }
}

/// In-process store, mainly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<SecretName, Secret>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secrets(secrets: impl IntoIterator<Item = Secret>) -> Self {
        let map = secrets
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect();
        Self {
            secrets: RwLock::new(map),
        }
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn read(&self, name: &SecretName, reason: &str) -> Result<Option<Secret>, SecretStoreError> {
        log::trace!("Reading secret '{}' ({})", name, reason);
        let guard = self.secrets.read().map_err(|_| SecretStoreError::Poisoned)?;
        Ok(guard.get(name).cloned())
    }

    async fn write(&self, secret: &Secret, reason: &str) -> Result<(), SecretStoreError> {
        log::trace!("Writing secret '{}' ({})", secret.name, reason);
        let mut guard = self.secrets.write().map_err(|_| SecretStoreError::Poisoned)?;
        guard.insert(secret.name.clone(), secret.clone());
        Ok(())
    }
}

/// Persists each secret as a JSON blob at `<datacenter>/<logical>.json`.
#[derive(Debug)]
pub struct BlobSecretStore<B> {
    blobs: B,
}

impl<B: BlobStore> BlobSecretStore<B> {
    pub fn new(blobs: B) -> Self {
        Self { blobs }
    }

    /// `<datacenter>/<logical>.json`, with `%`, `:`, `/` and `\` percent-encoded so
    /// distinct logical names never share a blob.
    fn blob_name(name: &SecretName) -> String {
        let mut logical = String::with_capacity(name.logical.len());
        for c in name.logical.chars() {
            match c {
                '%' => logical.push_str("%25"),
                ':' => logical.push_str("%3A"),
                '/' => logical.push_str("%2F"),
                '\\' => logical.push_str("%5C"),
                other => logical.push(other),
            }
        }
        format!("{}/{}.json", name.datacenter, logical)
    }
}

#[async_trait]
impl<B: BlobStore> SecretStore for BlobSecretStore<B> {
    async fn read(&self, name: &SecretName, reason: &str) -> Result<Option<Secret>, SecretStoreError> {
        let blob = Self::blob_name(name);
        log::trace!("Reading secret '{}' from blob '{}' ({})", name, blob, reason);

        let bytes = match self.blobs.load(&blob).await {
            Ok(bytes) => bytes,
            Err(BlobError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let secret: Secret = serde_json::from_slice(&bytes).map_err(|source| SecretStoreError::Corrupt {
            name: name.to_string(),
            source,
        })?;
        if secret.name != *name {
            log::warn!("Blob '{}' holds secret '{}', not '{}'; ignoring", blob, secret.name, name);
            return Ok(None);
        }
        Ok(Some(secret))
    }

    async fn write(&self, secret: &Secret, reason: &str) -> Result<(), SecretStoreError> {
        let blob = Self::blob_name(&secret.name);
        log::debug!("Writing secret '{}' to blob '{}' ({})", secret.name, blob, reason);

        let bytes = serde_json::to_vec_pretty(secret).map_err(|source| SecretStoreError::Serialize {
            name: secret.name.to_string(),
            source,
        })?;
        self.blobs.write(&blob, &bytes).await?;
        Ok(())
    }
}
