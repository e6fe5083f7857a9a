// src/core/resolver.rs

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::constants::{AZURE_STORAGE_TYPE, SQL_DB_TYPE};
use crate::models::{Resource, SecretName, Service};
use crate::system::secrets::{SecretStore, SecretStoreError};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Could not resolve {kind} resource '{name}': {source}")]
    SecretStore {
        kind: String,
        name: String,
        #[source]
        source: SecretStoreError,
    },
}

/// Turns one resource reference into its concrete configuration string.
///
/// `Ok(None)` means "omit from output"; `Err` is reserved for store failures.
#[async_trait]
pub trait ResolutionStrategy: Send + Sync {
    async fn resolve(
        &self,
        store: &dyn SecretStore,
        service: &Service,
        resource: &Resource,
    ) -> Result<Option<String>, SecretStoreError>;
}

/// Reads `azureStorage.<value>` from the service's datacenter and returns it verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct AzureStorageStrategy;

#[async_trait]
impl ResolutionStrategy for AzureStorageStrategy {
    async fn resolve(
        &self,
        store: &dyn SecretStore,
        service: &Service,
        resource: &Resource,
    ) -> Result<Option<String>, SecretStoreError> {
        let name = SecretName::new(
            format!("{}.{}", AZURE_STORAGE_TYPE, resource.value),
            service.datacenter,
        );
        let reason = format!("Generating config for {}", service.full_name());
        Ok(store.read(&name, &reason).await?.map(|secret| secret.value))
    }
}

/// Placeholder: SQL connection strings are not resolved yet and render as empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlDbStrategy;

#[async_trait]
impl ResolutionStrategy for SqlDbStrategy {
    async fn resolve(
        &self,
        _store: &dyn SecretStore,
        _service: &Service,
        _resource: &Resource,
    ) -> Result<Option<String>, SecretStoreError> {
        Ok(Some(String::new()))
    }
}

/// Maps resource type tags (case-insensitive) to resolution strategies.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    strategies: HashMap<String, Arc<dyn ResolutionStrategy>>,
}

impl ResolverRegistry {
    /// An empty registry; every type resolves to `None`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The registry shipped by default: `azureStorage` and `sqldb`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(AZURE_STORAGE_TYPE, AzureStorageStrategy);
        registry.register(SQL_DB_TYPE, SqlDbStrategy);
        registry
    }

    /// Adds or replaces the strategy for `kind`.
    pub fn register(&mut self, kind: &str, strategy: impl ResolutionStrategy + 'static) {
        self.strategies
            .insert(kind.to_lowercase(), Arc::new(strategy));
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn ResolutionStrategy>> {
        self.strategies.get(&kind.to_lowercase())
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.kinds().collect();
        kinds.sort_unstable();
        f.debug_struct("ResolverRegistry").field("kinds", &kinds).finish()
    }
}

/// Dispatches resources to the strategy registered for their type.
///
/// Nothing is cached: each call performs its own store read so rotated secrets are
/// picked up on the next render.
#[derive(Debug, Clone)]
pub struct ResourceResolver {
    registry: ResolverRegistry,
}

impl Default for ResourceResolver {
    fn default() -> Self {
        Self::new(ResolverRegistry::with_defaults())
    }
}

impl ResourceResolver {
    pub fn new(registry: ResolverRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ResolverRegistry {
        &self.registry
    }

    pub async fn resolve(
        &self,
        store: &dyn SecretStore,
        service: &Service,
        resource: &Resource,
    ) -> Result<Option<String>, ResolveError> {
        let Some(strategy) = self.registry.get(&resource.kind) else {
            log::debug!(
                "No resolver registered for type '{}'; omitting resource '{}'",
                resource.kind,
                resource.name
            );
            return Ok(None);
        };

        let resolved = strategy
            .resolve(store, service, resource)
            .await
            .map_err(|source| ResolveError::SecretStore {
                kind: resource.kind.clone(),
                name: resource.name.clone(),
                source,
            })?;

        if resolved.is_none() {
            log::debug!("Resource {}/{} has no secret; omitting", resource.kind, resource.name);
        }
        Ok(resolved)
    }
}
