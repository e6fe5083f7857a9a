//! # Config Template Model
//!
//! Builds the read-only object graph a template is rendered against for one service:
//!
//! - `resources`: the datacenter's resources grouped by type, then by name, each value
//!   already resolved through the [`ResourceResolver`].
//! - `services`: every service in the datacenter by name, exposing `uri`, `name`,
//!   `fullName`, `type`, `attributes` and, when an admin secret exists, `adminUri`.
//! - `service`: the target service's own view.
//!
//! All resolution happens up front in [`ConfigTemplateModel::build`]; the renderer never
//! sees a partially resolved graph.

use thiserror::Error;
use url::Url;

use crate::core::dynamic::{ConfigMap, ConfigValue, Dyn};
use crate::core::resolver::{ResolveError, ResourceResolver};
use crate::models::{Datacenter, SecretName, Service};
use crate::system::secrets::{SecretStore, SecretStoreError};

/// User name injected into admin URIs whose secret holds only a password.
const DEFAULT_ADMIN_USER: &str = "admin";

#[derive(Error, Debug)]
pub enum ConfigModelError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("Could not read the admin credential of service '{service}': {source}")]
    AdminSecret {
        service: String,
        #[source]
        source: SecretStoreError,
    },
    #[error("Service '{service}' belongs to datacenter {actual}, not {expected}.")]
    ServiceNotInDatacenter {
        service: String,
        expected: u32,
        actual: u32,
    },
}

#[derive(Debug, Clone)]
pub struct ConfigTemplateModel {
    environment: String,
    datacenter: u32,
    service: Dyn,
    resources: Dyn,
    services: Dyn,
}

impl ConfigTemplateModel {
    pub async fn build(
        resolver: &ResourceResolver,
        store: &dyn SecretStore,
        datacenter: &Datacenter,
        service: &Service,
    ) -> Result<Self, ConfigModelError> {
        if service.datacenter != datacenter.id {
            return Err(ConfigModelError::ServiceNotInDatacenter {
                service: service.name.clone(),
                expected: datacenter.id,
                actual: service.datacenter,
            });
        }
        log::debug!("Building config model for '{}'", service.full_name());

        let mut resources = ConfigMap::new();
        for resource in &datacenter.resources {
            if let Some(value) = resolver.resolve(store, service, resource).await? {
                resources.update_map(&resource.kind, |by_name| by_name.insert(resource.name.clone(), value));
            }
        }

        let mut services = ConfigMap::new();
        let mut target = Dyn::Absent;
        for candidate in &datacenter.services {
            let view = service_view(store, candidate).await?;
            if candidate.name.eq_ignore_ascii_case(&service.name) {
                target = Dyn::wrap(view.clone());
            }
            services.insert(candidate.name.clone(), view);
        }

        Ok(Self {
            environment: service.environment.clone(),
            datacenter: datacenter.id,
            service: target,
            resources: Dyn::wrap(resources),
            services: Dyn::wrap(services),
        })
    }

    pub fn resources(&self) -> &Dyn {
        &self.resources
    }

    pub fn services(&self) -> &Dyn {
        &self.services
    }

    pub fn service(&self) -> &Dyn {
        &self.service
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn datacenter(&self) -> u32 {
        self.datacenter
    }

    /// The whole graph as one tree, rooted at `resources`, `services`, `service`,
    /// `environment` and `datacenter`.
    pub fn root(&self) -> Dyn {
        let mut root = ConfigMap::new();
        for (key, value) in [
            ("resources", &self.resources),
            ("services", &self.services),
            ("service", &self.service),
        ] {
            if let Some(v) = value.as_value() {
                root.insert(key, v.clone());
            }
        }
        root.insert("environment", self.environment.clone());
        root.insert("datacenter", i64::from(self.datacenter));
        Dyn::wrap(root)
    }
}

async fn service_view(store: &dyn SecretStore, service: &Service) -> Result<ConfigMap, ConfigModelError> {
    let mut view = ConfigMap::new();
    view.insert("uri", service.uri.clone());
    view.insert("name", service.name.clone());
    view.insert("fullName", service.full_name());
    view.insert("type", service.kind.clone());
    view.insert("attributes", ConfigValue::from(&service.attributes));

    if let Some(admin_uri) = admin_uri(store, service).await? {
        view.insert("adminUri", admin_uri);
    }
    Ok(view)
}

/// The service URI with basic-auth credentials from `http.admin:<service>` injected.
async fn admin_uri(store: &dyn SecretStore, service: &Service) -> Result<Option<String>, ConfigModelError> {
    let name = SecretName::for_admin(service);
    let reason = format!("Generating admin URI for {}", service.full_name());
    let secret = store
        .read(&name, &reason)
        .await
        .map_err(|source| ConfigModelError::AdminSecret {
            service: service.name.clone(),
            source,
        })?;

    let Some(secret) = secret else {
        return Ok(None);
    };

    let (user, password) = secret
        .value
        .split_once(':')
        .unwrap_or((DEFAULT_ADMIN_USER, secret.value.as_str()));

    let Ok(mut uri) = Url::parse(&service.uri) else {
        log::warn!("Service '{}' has an unparseable URI; no admin URI produced", service.name);
        return Ok(None);
    };
    if uri.set_username(user).is_err() || uri.set_password(Some(password)).is_err() {
        log::warn!("URI of service '{}' cannot carry credentials", service.name);
        return Ok(None);
    }
    Ok(Some(uri.to_string()))
}
