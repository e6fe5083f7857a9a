// src/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::constants::{ADMIN_SECRET_PREFIX, CERT_SECRET_PREFIX};

/// Errors raised while reading or validating the infrastructure model file.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Could not read model file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid TOML in model file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid JSON in model file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Environment name '{name}' is declared more than once.")]
    DuplicateEnvironment { name: String },
    #[error("Datacenter {id} is declared more than once in environment '{environment}'.")]
    DuplicateDatacenter { environment: String, id: u32 },
    #[error("Service '{name}' is declared more than once in datacenter {datacenter} of '{environment}'.")]
    DuplicateService {
        environment: String,
        datacenter: u32,
        name: String,
    },
}

// --- INFRASTRUCTURE MODEL (What is read from the model file) ---

/// Root of the infrastructure topology. Immutable once loaded.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppModel {
    #[serde(default)]
    pub environments: Vec<Environment>,
}

/// Identity used to authenticate against the cloud management API.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub tenant: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub name: String,
    #[serde(default)]
    pub subscription: Option<Subscription>,
    #[serde(default)]
    pub datacenters: Vec<Datacenter>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Datacenter {
    pub id: u32,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub services: Vec<Service>,
}

/// A named, typed reference whose concrete value lives in the secret store.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub uri: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Filled in by [`AppModel::link`] after parsing.
    #[serde(skip)]
    pub environment: String,
    /// Filled in by [`AppModel::link`] after parsing.
    #[serde(skip)]
    pub datacenter: u32,
}

impl Service {
    /// `<environment>-<datacenter>-<name>`, the name templates are keyed by.
    pub fn full_name(&self) -> String {
        format!("{}-{}-{}", self.environment, self.datacenter, self.name)
    }
}

impl AppModel {
    /// Loads the model from disk. `.json` files are parsed as JSON, anything else as TOML.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        log::debug!("Loading app model from '{}'", path.display());
        let content = fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ModelError> {
        let model: Self = toml::from_str(content)?;
        model.link()
    }

    pub fn from_json_str(content: &str) -> Result<Self, ModelError> {
        let model: Self = serde_json::from_str(content)?;
        model.link()
    }

    /// Validates uniqueness rules and back-fills each service's parent identifiers.
    fn link(mut self) -> Result<Self, ModelError> {
        let mut env_names = HashSet::new();
        for env in &mut self.environments {
            if !env_names.insert(env.name.to_lowercase()) {
                return Err(ModelError::DuplicateEnvironment {
                    name: env.name.clone(),
                });
            }

            let mut dc_ids = HashSet::new();
            for dc in &mut env.datacenters {
                if !dc_ids.insert(dc.id) {
                    return Err(ModelError::DuplicateDatacenter {
                        environment: env.name.clone(),
                        id: dc.id,
                    });
                }

                let mut service_names = HashSet::new();
                for service in &mut dc.services {
                    if !service_names.insert(service.name.to_lowercase()) {
                        return Err(ModelError::DuplicateService {
                            environment: env.name.clone(),
                            datacenter: dc.id,
                            name: service.name.clone(),
                        });
                    }
                    service.environment = env.name.clone();
                    service.datacenter = dc.id;
                }
            }
        }

        log::debug!("App model linked: {} environment(s)", self.environments.len());
        Ok(self)
    }

    /// Case-insensitive environment lookup.
    pub fn environment(&self, name: &str) -> Option<&Environment> {
        self.environments
            .iter()
            .find(|env| env.name.eq_ignore_ascii_case(name))
    }
}

impl Environment {
    pub fn datacenter(&self, id: u32) -> Option<&Datacenter> {
        self.datacenters.iter().find(|dc| dc.id == id)
    }

    /// Tenant used for token acquisition, if the environment declares a subscription.
    pub fn tenant(&self) -> Option<&str> {
        self.subscription.as_ref().map(|s| s.tenant.as_str())
    }
}

impl Datacenter {
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn resource(&self, kind: &str, name: &str) -> Option<&Resource> {
        self.resources
            .iter()
            .find(|r| r.kind.eq_ignore_ascii_case(kind) && r.name.eq_ignore_ascii_case(name))
    }
}

// --- SECRET MODELS (consumed from the secret store) ---

/// Composite secret key: `<logical>:<datacenter>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SecretName {
    pub logical: String,
    pub datacenter: u32,
}

impl SecretName {
    pub fn new(logical: impl Into<String>, datacenter: u32) -> Self {
        Self {
            logical: logical.into(),
            datacenter,
        }
    }

    /// `http.admin:<serviceName>` scoped to the service's datacenter.
    pub fn for_admin(service: &Service) -> Self {
        Self::new(
            format!("{}{}", ADMIN_SECRET_PREFIX, service.name),
            service.datacenter,
        )
    }

    pub fn for_certificate(thumbprint: &str, datacenter: u32) -> Self {
        Self::new(
            format!("{}{}", CERT_SECRET_PREFIX, thumbprint.to_uppercase()),
            datacenter,
        )
    }
}

impl fmt::Display for SecretName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.logical, self.datacenter)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("'{0}' is not a secret name of the form '<name>:<datacenter>'.")]
pub struct InvalidSecretName(pub String);

impl FromStr for SecretName {
    type Err = InvalidSecretName;

    // The logical part may itself contain ':' (e.g. `http.admin:api:0`), so split on the last one.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (logical, dc) = s
            .rsplit_once(':')
            .ok_or_else(|| InvalidSecretName(s.to_string()))?;
        let datacenter = dc
            .parse()
            .map_err(|_| InvalidSecretName(s.to_string()))?;
        if logical.is_empty() {
            return Err(InvalidSecretName(s.to_string()));
        }
        Ok(Self::new(logical, datacenter))
    }
}

impl TryFrom<String> for SecretName {
    type Error = InvalidSecretName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SecretName> for String {
    fn from(value: SecretName) -> Self {
        value.to_string()
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SecretKind {
    Certificate,
    /// The value is the name of another secret.
    Link,
    Password,
    Generic,
}

/// A stored credential or value record.
#[derive(Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub name: SecretName,
    #[serde(rename = "type")]
    pub kind: SecretKind,
    pub value: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Secret {
    pub fn new(name: SecretName, kind: SecretKind, value: impl Into<String>) -> Self {
        Self {
            name,
            kind,
            value: value.into(),
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("value", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
