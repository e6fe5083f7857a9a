// src/auth/cache.rs

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::auth::token::Token;
use crate::system::blob::write_atomically;

const HASH_TRUNCATE_LENGTH: usize = 16; // 16 bytes = 32 hex characters

/// Canonical form of a tenant id: trimmed and lower-cased.
pub fn normalize_tenant(tenant_id: &str) -> String {
    tenant_id.trim().to_lowercase()
}

#[derive(Error, Debug)]
pub enum TokenCacheError {
    #[error("Token cache I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not serialize token: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Token cache worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// One JSON file per tenant under a root directory. Writes replace the file atomically,
/// so concurrent writers for the same tenant end with the last writer's token.
#[derive(Debug, Clone)]
pub struct TokenCache {
    root: PathBuf,
}

impl TokenCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Tenant ids are hashed so any tenant string maps to a safe, stable file name.
    pub fn path_for(&self, tenant_id: &str) -> PathBuf {
        let normalized = normalize_tenant(tenant_id);
        let hash = blake3::hash(normalized.as_bytes());
        let truncated = hash.as_bytes().get(..HASH_TRUNCATE_LENGTH).unwrap_or_default();
        self.root.join(format!("{}.json", hex::encode(truncated)))
    }

    /// Returns the cached token for `tenant_id`. A missing or unreadable entry is `None`.
    pub async fn load(&self, tenant_id: &str) -> Result<Option<Token>, TokenCacheError> {
        let path = self.path_for(tenant_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("Token cache miss for tenant '{}'", tenant_id);
                return Ok(None);
            }
            Err(source) => return Err(TokenCacheError::Io { path, source }),
        };

        match serde_json::from_slice::<Token>(&bytes) {
            Ok(token) if normalize_tenant(&token.tenant_id) == normalize_tenant(tenant_id) => {
                log::debug!("Token cache hit for tenant '{}'", tenant_id);
                Ok(Some(token))
            }
            Ok(_) => {
                log::warn!("Token cache entry '{}' belongs to another tenant; ignoring", path.display());
                Ok(None)
            }
            Err(e) => {
                log::warn!("Ignoring corrupt token cache entry '{}': {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Persists `token` under its normalized tenant id.
    pub async fn store(&self, token: &Token) -> Result<(), TokenCacheError> {
        let path = self.path_for(&token.tenant_id);
        let mut normalized = token.clone();
        normalized.tenant_id = normalize_tenant(&token.tenant_id);
        let bytes = serde_json::to_vec_pretty(&normalized)?;
        log::debug!("Persisting token for tenant '{}' to '{}'", token.tenant_id, path.display());

        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&target, &bytes))
            .await?
            .map_err(|source| TokenCacheError::Io { path, source })
    }

    /// Deletes the cached token; removing a token that is not there is not an error.
    pub async fn remove(&self, tenant_id: &str) -> Result<(), TokenCacheError> {
        let path = self.path_for(tenant_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(TokenCacheError::Io { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    #[test]
    fn test_path_is_stable_and_case_insensitive() {
        let cache = TokenCache::new("/tokens");
        let a = cache.path_for("Contoso.onmicrosoft.com");
        let b = cache.path_for(" contoso.onmicrosoft.com ");
        assert_eq!(a, b);
        assert_ne!(a, cache.path_for("fabrikam.onmicrosoft.com"));

        let file = a.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(file.len(), 32 + ".json".len());
    }

    #[tokio::test]
    async fn test_store_load_remove() {
        let dir = TempDir::new().unwrap();
        let cache = TokenCache::new(dir.path().join("nested").join("tokens"));
        let token = Token::new("tenant-a", "access", Some("refresh".into()), Utc::now() + Duration::hours(1));

        assert_eq!(cache.load("tenant-a").await.unwrap(), None);
        cache.store(&token).await.unwrap();
        assert_eq!(cache.load("TENANT-A").await.unwrap(), Some(token.clone()));

        let replaced = Token::new("tenant-a", "access-2", None, Utc::now() + Duration::hours(2));
        cache.store(&replaced).await.unwrap();
        assert_eq!(cache.load("tenant-a").await.unwrap(), Some(replaced));

        cache.remove("tenant-a").await.unwrap();
        cache.remove("tenant-a").await.unwrap();
        assert_eq!(cache.load("tenant-a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_padded_tenant_round_trips() {
        let dir = TempDir::new().unwrap();
        let cache = TokenCache::new(dir.path());
        let token = Token::new(" Tenant-A ", "access", None, Utc::now() + Duration::hours(1));

        cache.store(&token).await.unwrap();
        let loaded = cache.load(" tenant-a ").await.unwrap().unwrap();
        assert_eq!(loaded.tenant_id, "tenant-a");
        assert_eq!(loaded.access_token, "access");
        assert!(cache.load("TENANT-A").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_entry_for_other_tenant_reads_as_miss() {
        let dir = TempDir::new().unwrap();
        let cache = TokenCache::new(dir.path());
        let foreign = Token::new("tenant-b", "access", None, Utc::now() + Duration::hours(1));
        std::fs::write(cache.path_for("tenant-a"), serde_json::to_vec(&foreign).unwrap()).unwrap();

        assert_eq!(cache.load("tenant-a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_entry_reads_as_miss() {
        let dir = TempDir::new().unwrap();
        let cache = TokenCache::new(dir.path());
        std::fs::write(cache.path_for("tenant-a"), b"not json").unwrap();
        assert_eq!(cache.load("tenant-a").await.unwrap(), None);
    }
}
