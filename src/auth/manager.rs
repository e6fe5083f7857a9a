// src/auth/manager.rs

use chrono::Utc;
use std::fmt;
use std::sync::Arc;

use crate::auth::cache::{TokenCache, TokenCacheError, normalize_tenant};
use crate::auth::oauth::{DeviceCodeLogin, HttpRefresher, OAuthSettings};
use crate::auth::token::Token;
use crate::auth::{AuthError, InteractiveLogin, SilentRefresh};
use crate::system::affinity::run_on_login_thread;

/// Acquires, refreshes and persists tokens per tenant.
///
/// Only cache I/O failures are errors. A login that fails or is cancelled yields
/// `Ok(None)` so callers can choose to retry or abort.
#[derive(Clone)]
pub struct TokenManager {
    cache: TokenCache,
    login: Arc<dyn InteractiveLogin>,
    refresher: Arc<dyn SilentRefresh>,
}

impl TokenManager {
    pub fn new(
        cache: TokenCache,
        login: Arc<dyn InteractiveLogin>,
        refresher: Arc<dyn SilentRefresh>,
    ) -> Self {
        Self {
            cache,
            login,
            refresher,
        }
    }

    /// Device-code login and refresh-token renewal against `settings`.
    pub fn with_oauth(cache: TokenCache, settings: OAuthSettings) -> Result<Self, AuthError> {
        let refresher = HttpRefresher::new(settings.clone())?;
        Ok(Self::new(
            cache,
            Arc::new(DeviceCodeLogin::new(settings)),
            Arc::new(refresher),
        ))
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Interactive acquisition on the dedicated login thread.
    pub async fn get_token(&self, tenant_id: &str) -> Result<Option<Token>, TokenCacheError> {
        let tenant_id = normalize_tenant(tenant_id);
        let tenant_id = tenant_id.as_str();
        log::info!("Starting interactive login for tenant '{}'", tenant_id);
        let login = Arc::clone(&self.login);
        let tenant = tenant_id.to_string();

        let outcome = run_on_login_thread(move || login.login(&tenant)).await;
        let mut token = match outcome {
            Ok(Ok(token)) => token,
            Ok(Err(e)) => {
                log::warn!("Interactive login for tenant '{}' failed: {}", tenant_id, e);
                return Ok(None);
            }
            Err(e) => {
                log::warn!("Interactive login for tenant '{}' did not complete: {}", tenant_id, e);
                return Ok(None);
            }
        };

        token.tenant_id = tenant_id.to_string();
        self.cache.store(&token).await?;
        Ok(Some(token))
    }

    /// Silent renewal, falling back to [`get_token`](Self::get_token) on any failure.
    pub async fn refresh_token(&self, token: &Token) -> Result<Option<Token>, TokenCacheError> {
        let tenant_id = normalize_tenant(&token.tenant_id);
        let tenant_id = tenant_id.as_str();
        let refresh_token = match token.refresh_token.as_deref() {
            Some(refresh_token) if token.can_refresh() => refresh_token,
            _ => {
                log::debug!("Token for tenant '{}' has no refresh token", tenant_id);
                return self.get_token(tenant_id).await;
            }
        };

        match self.refresher.refresh(tenant_id, refresh_token).await {
            Ok(mut renewed) => {
                renewed.tenant_id = tenant_id.to_string();
                if renewed.refresh_token.is_none() {
                    renewed.refresh_token = token.refresh_token.clone();
                }
                self.cache.store(&renewed).await?;
                log::debug!("Refreshed token for tenant '{}'", tenant_id);
                Ok(Some(renewed))
            }
            Err(e) => {
                log::warn!(
                    "Silent refresh for tenant '{}' failed ({}); falling back to interactive login",
                    tenant_id,
                    e
                );
                self.get_token(tenant_id).await
            }
        }
    }

    /// Cached token only, no network.
    pub async fn cached(&self, tenant_id: &str) -> Result<Option<Token>, TokenCacheError> {
        self.cache.load(tenant_id).await
    }

    /// A usable token: cached while valid, refreshed when close to expiry, else acquired.
    pub async fn token_for(&self, tenant_id: &str) -> Result<Option<Token>, TokenCacheError> {
        match self.cache.load(tenant_id).await? {
            Some(token) if !token.needs_refresh_at(Utc::now()) => Ok(Some(token)),
            Some(token) => self.refresh_token(&token).await,
            None => self.get_token(tenant_id).await,
        }
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
