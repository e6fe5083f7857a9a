//! # Credential Lifecycle
//!
//! OAuth tokens needed to call the cloud management API, cached per tenant on disk.
//!
//! A token moves through `NoToken -> Acquiring -> Acquired`, is renewed silently while its
//! refresh token is accepted, and falls back to a fresh interactive acquisition when renewal
//! fails. Interactive login may need a UI-affine, blocking thread, so it is expressed as a
//! synchronous [`InteractiveLogin`] capability that the [`TokenManager`] runs on a dedicated
//! thread; silent renewal is an async [`SilentRefresh`] capability. Both are pluggable, which
//! lets headless hosts supply a device-code or non-interactive login.

pub mod cache;
pub mod manager;
pub mod oauth;
pub mod token;

use async_trait::async_trait;
use thiserror::Error;

pub use cache::{TokenCache, TokenCacheError};
pub use manager::TokenManager;
pub use token::Token;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Sign-in was declined: {reason}")]
    Denied { reason: String },
    #[error("The sign-in code expired before it was used.")]
    CodeExpired,
    #[error("The authority rejected the request ({code}): {description}")]
    Rejected { code: String, description: String },
    #[error("HTTP error talking to the authority: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid authority URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Unexpected response from the authority: {0}")]
    Protocol(String),
}

/// Acquires a token by interacting with a user. Runs on a dedicated thread and may block.
pub trait InteractiveLogin: Send + Sync {
    fn login(&self, tenant_id: &str) -> Result<Token, AuthError>;
}

/// Renews a token without user interaction.
#[async_trait]
pub trait SilentRefresh: Send + Sync {
    async fn refresh(&self, tenant_id: &str, refresh_token: &str) -> Result<Token, AuthError>;
}
