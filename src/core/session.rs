//! # Operations Session
//!
//! The entry point callers use: loads the infrastructure model once, tracks the
//! environment being operated on, and owns the [`TokenManager`] used to reach the
//! cloud management API.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::auth::oauth::OAuthSettings;
use crate::auth::{AuthError, Token, TokenCache, TokenCacheError, TokenManager};
use crate::constants::{APP_MODEL_VAR, CURRENT_ENVIRONMENT_VAR};
use crate::core::config_model::{ConfigModelError, ConfigTemplateModel};
use crate::core::interpolator;
use crate::core::paths::{self, PathError};
use crate::core::resolver::ResourceResolver;
use crate::core::template_source::{TemplateError, TemplateSource};
use crate::models::{AppModel, Datacenter, Environment, ModelError, Service};
use crate::system::secrets::SecretStore;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Environment variable '{name}' is not set. It must point at the app model file.")]
    MissingVariable { name: &'static str },
    #[error("App model file '{path}' does not exist.")]
    ModelNotFound { path: PathBuf },
    #[error("Path error: {0}")]
    Path(#[from] PathError),
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Environment '{name}' not found in the app model.")]
    EnvironmentNotFound { name: String },
    #[error("No current environment is selected.")]
    NoCurrentEnvironment,
    #[error("Environment '{environment}' has no subscription, so no tenant to authenticate against.")]
    NoTenant { environment: String },
    #[error("Datacenter {id} not found in environment '{environment}'.")]
    DatacenterNotFound { environment: String, id: u32 },
    #[error("Service '{name}' not found in datacenter {datacenter}.")]
    ServiceNotFound { name: String, datacenter: u32 },
    #[error("Authentication setup failed: {0}")]
    Auth(#[from] AuthError),
    #[error("Token cache error: {0}")]
    TokenCache(#[from] TokenCacheError),
    #[error("Config resolution failed: {0}")]
    ConfigModel(#[from] ConfigModelError),
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
}

type SessionResult<T> = Result<T, SessionError>;

/// Explicit bootstrap settings for an [`OpsSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub model_path: PathBuf,
    pub current_environment: Option<String>,
    /// Overrides the default per-user token cache location.
    pub token_store_root: Option<PathBuf>,
}

impl SessionConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            current_environment: None,
            token_store_root: None,
        }
    }

    /// Reads `NUOPS_APP_MODEL` and `NUOPS_CURRENT_ENVIRONMENT` from the process environment.
    pub fn from_env() -> SessionResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but with any variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SessionResult<Self> {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let raw_path = read(APP_MODEL_VAR).ok_or(SessionError::MissingVariable {
            name: APP_MODEL_VAR,
        })?;
        let model_path = paths::expand_path(&raw_path)?;

        Ok(Self {
            model_path,
            current_environment: read(CURRENT_ENVIRONMENT_VAR).map(|v| v.trim().to_string()),
            token_store_root: None,
        })
    }
}

#[derive(Debug)]
pub struct OpsSession {
    model: Arc<AppModel>,
    model_path: PathBuf,
    current: Option<usize>,
    tokens: TokenManager,
    resolver: ResourceResolver,
}

impl OpsSession {
    /// Loads the model at `model_path`; tokens are cached under `token_store_root` or the default.
    pub fn open(model_path: impl Into<PathBuf>, token_store_root: Option<PathBuf>) -> SessionResult<Self> {
        Self::load(SessionConfig {
            token_store_root,
            ..SessionConfig::new(model_path)
        })
    }

    /// Bootstraps from `NUOPS_APP_MODEL` / `NUOPS_CURRENT_ENVIRONMENT`.
    pub fn load_from_environment() -> SessionResult<Self> {
        Self::load(SessionConfig::from_env()?)
    }

    pub fn load(config: SessionConfig) -> SessionResult<Self> {
        if !config.model_path.is_file() {
            return Err(SessionError::ModelNotFound {
                path: config.model_path,
            });
        }
        let model_path = dunce::canonicalize(&config.model_path).map_err(|source| ModelError::Io {
            path: config.model_path.clone(),
            source,
        })?;
        let model = AppModel::load(&model_path)?;
        log::info!(
            "Loaded app model '{}' with {} environment(s)",
            model_path.display(),
            model.environments.len()
        );

        let token_root = match config.token_store_root {
            Some(root) => root,
            None => paths::default_token_store_root()?,
        };
        let tokens = TokenManager::with_oauth(TokenCache::new(token_root), OAuthSettings::default())?;

        let mut session = Self {
            model: Arc::new(model),
            model_path,
            current: None,
            tokens,
            resolver: ResourceResolver::default(),
        };

        if let Some(name) = config.current_environment.as_deref() {
            session.set_current_environment(name, false)?;
        }
        Ok(session)
    }

    /// Replaces the token manager, e.g. with a headless login provider.
    pub fn with_token_manager(mut self, tokens: TokenManager) -> Self {
        self.tokens = tokens;
        self
    }

    /// Replaces the resolver, e.g. with a registry carrying extra resource types.
    pub fn with_resolver(mut self, resolver: ResourceResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn app_model(&self) -> &AppModel {
        &self.model
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn token_manager(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn resolver(&self) -> &ResourceResolver {
        &self.resolver
    }

    pub fn current_environment(&self) -> Option<&Environment> {
        self.current.and_then(|i| self.model.environments.get(i))
    }

    /// Selects an environment by name (case-insensitive).
    ///
    /// When the name is unknown, `throw_on_failure` decides between returning
    /// [`SessionError::EnvironmentNotFound`] and leaving the selection untouched.
    pub fn set_current_environment(&mut self, name: &str, throw_on_failure: bool) -> SessionResult<()> {
        let position = self
            .model
            .environments
            .iter()
            .position(|env| env.name.eq_ignore_ascii_case(name.trim()));

        match position {
            Some(i) => {
                log::debug!("Current environment set to '{}'", name);
                self.current = Some(i);
                Ok(())
            }
            None if throw_on_failure => Err(SessionError::EnvironmentNotFound {
                name: name.to_string(),
            }),
            None => {
                log::warn!("Environment '{}' not found; keeping the current selection", name);
                Ok(())
            }
        }
    }

    fn require_environment(&self) -> SessionResult<&Environment> {
        self.current_environment()
            .ok_or(SessionError::NoCurrentEnvironment)
    }

    fn locate(&self, datacenter_id: u32, service_name: &str) -> SessionResult<(&Datacenter, &Service)> {
        let env = self.require_environment()?;
        let datacenter = env
            .datacenter(datacenter_id)
            .ok_or_else(|| SessionError::DatacenterNotFound {
                environment: env.name.clone(),
                id: datacenter_id,
            })?;
        let service = datacenter
            .service(service_name)
            .ok_or_else(|| SessionError::ServiceNotFound {
                name: service_name.to_string(),
                datacenter: datacenter_id,
            })?;
        Ok((datacenter, service))
    }

    /// A usable token for the current environment's tenant, or `None` when login failed.
    pub async fn current_token(&self) -> SessionResult<Option<Token>> {
        let env = self.require_environment()?;
        let tenant = env.tenant().ok_or_else(|| SessionError::NoTenant {
            environment: env.name.clone(),
        })?;
        Ok(self.tokens.token_for(tenant).await?)
    }

    /// Resolves every resource of the service's datacenter and builds the template model.
    pub async fn build_config_model(
        &self,
        store: &dyn SecretStore,
        datacenter_id: u32,
        service_name: &str,
    ) -> SessionResult<ConfigTemplateModel> {
        let (datacenter, service) = self.locate(datacenter_id, service_name)?;
        Ok(ConfigTemplateModel::build(&self.resolver, store, datacenter, service).await?)
    }

    /// One config-generation pass. `Ok(None)` when the service has no template.
    pub async fn generate_config(
        &self,
        store: &dyn SecretStore,
        templates: &dyn TemplateSource,
        datacenter_id: u32,
        service_name: &str,
    ) -> SessionResult<Option<String>> {
        let (datacenter, service) = self.locate(datacenter_id, service_name)?;
        let Some(template) = templates.read_template(service).await? else {
            log::info!("No template for '{}'; nothing to render", service.full_name());
            return Ok(None);
        };

        let model = ConfigTemplateModel::build(&self.resolver, store, datacenter, service).await?;
        Ok(Some(interpolator::render(&template, &model)))
    }
}
