// src/auth/oauth.rs

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use url::Url;

use crate::auth::token::Token;
use crate::auth::{AuthError, InteractiveLogin, SilentRefresh};

/// Well-known public client id used by cloud management tooling.
pub const DEFAULT_CLIENT_ID: &str = "1950a258-227b-4e31-a9cf-717495945fc2";
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com/";
pub const DEFAULT_RESOURCE: &str = "https://management.core.windows.net/";

/// Lifetime assumed when the authority omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;
/// Upper bound on any advertised lifetime.
const MAX_EXPIRES_IN_SECS: i64 = 366 * 24 * 3600;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const MAX_POLL_INTERVAL_SECS: u64 = 60;
const SLOW_DOWN_STEP_SECS: u64 = 5;
/// Device codes are short-lived; anything advertised beyond this is capped.
const DEFAULT_DEVICE_CODE_LIFETIME_SECS: u64 = 900;
const MAX_DEVICE_CODE_LIFETIME_SECS: u64 = 3600;

/// Where and as whom to authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthSettings {
    pub authority: Url,
    pub client_id: String,
    pub resource: String,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            authority: Url::parse(DEFAULT_AUTHORITY).expect("default authority is a valid URL"),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            resource: DEFAULT_RESOURCE.to_string(),
        }
    }
}

impl OAuthSettings {
    pub fn token_endpoint(&self, tenant_id: &str) -> Result<Url, AuthError> {
        self.tenant_endpoint(tenant_id, "oauth2/token")
    }

    pub fn device_code_endpoint(&self, tenant_id: &str) -> Result<Url, AuthError> {
        self.tenant_endpoint(tenant_id, "oauth2/devicecode")
    }

    fn tenant_endpoint(&self, tenant_id: &str, tail: &str) -> Result<Url, AuthError> {
        // `join` drops the last segment unless the base ends with '/'.
        let mut base = self.authority.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base.join(&format!("{}/{}", tenant_id.trim(), tail))?)
    }
}

/// Some authorities send numbers as JSON strings (`"expires_in": "3599"`).
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<NumberOrText>::deserialize(deserializer)? {
        Some(NumberOrText::Number(n)) => Some(n),
        Some(NumberOrText::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    expires_in: Option<u64>,
    #[serde(default)]
    token_type: Option<String>,
}

impl TokenResponse {
    fn into_token(self, tenant_id: &str) -> Token {
        let lifetime = i64::try_from(self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS))
            .unwrap_or(MAX_EXPIRES_IN_SECS)
            .min(MAX_EXPIRES_IN_SECS);
        let mut token = Token::new(
            tenant_id,
            self.access_token,
            self.refresh_token,
            Utc::now() + ChronoDuration::seconds(lifetime),
        );
        if let Some(kind) = self.token_type {
            token.token_type = kind;
        }
        token
    }
}

#[derive(Deserialize, Debug)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl ErrorResponse {
    fn into_error(self) -> AuthError {
        AuthError::Rejected {
            code: self.error,
            description: self.error_description.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    #[serde(alias = "verification_uri")]
    verification_url: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    expires_in: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    interval: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

fn parse_token_body(status: reqwest::StatusCode, body: &str, tenant_id: &str) -> Result<Token, AuthError> {
    if status.is_success() {
        let response: TokenResponse = serde_json::from_str(body)
            .map_err(|e| AuthError::Protocol(format!("token response: {e}")))?;
        return Ok(response.into_token(tenant_id));
    }
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => Err(err.into_error()),
        Err(_) => Err(AuthError::Protocol(format!("HTTP {status} without an OAuth error body"))),
    }
}

/// Renews tokens with the `refresh_token` grant.
#[derive(Debug, Clone)]
pub struct HttpRefresher {
    client: reqwest::Client,
    settings: OAuthSettings,
}

impl HttpRefresher {
    pub fn new(settings: OAuthSettings) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, settings })
    }
}

#[async_trait]
impl SilentRefresh for HttpRefresher {
    async fn refresh(&self, tenant_id: &str, refresh_token: &str) -> Result<Token, AuthError> {
        let endpoint = self.settings.token_endpoint(tenant_id)?;
        log::debug!("Refreshing token for tenant '{}' at {}", tenant_id, endpoint);

        let response = self
            .client
            .post(endpoint)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.settings.client_id.as_str()),
                ("refresh_token", refresh_token),
                ("resource", self.settings.resource.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        parse_token_body(status, &body, tenant_id)
    }
}

type Notify = Box<dyn Fn(&str) + Send + Sync>;

/// Interactive login via the OAuth device-code flow.
///
/// Blocks the calling thread while the user signs in elsewhere, so it must run on the
/// dedicated login thread, never on a runtime worker.
pub struct DeviceCodeLogin {
    settings: OAuthSettings,
    notify: Notify,
}

impl DeviceCodeLogin {
    /// Prints the sign-in instructions to stderr.
    pub fn new(settings: OAuthSettings) -> Self {
        Self::with_notifier(settings, |message| eprintln!("{}", message))
    }

    /// Delivers the sign-in instructions to `notify` instead of stderr.
    pub fn with_notifier(settings: OAuthSettings, notify: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            settings,
            notify: Box::new(notify),
        }
    }

    fn request_code(&self, client: &reqwest::blocking::Client, tenant_id: &str) -> Result<DeviceCodeResponse, AuthError> {
        let response = client
            .post(self.settings.device_code_endpoint(tenant_id)?)
            .form(&[
                ("client_id", self.settings.client_id.as_str()),
                ("resource", self.settings.resource.as_str()),
            ])
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(serde_json::from_str::<ErrorResponse>(&body)
                .map(ErrorResponse::into_error)
                .unwrap_or_else(|_| AuthError::Protocol(format!("device code request failed with HTTP {status}"))));
        }
        serde_json::from_str(&body).map_err(|e| AuthError::Protocol(format!("device code response: {e}")))
    }
}

impl fmt::Debug for DeviceCodeLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCodeLogin")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl InteractiveLogin for DeviceCodeLogin {
    fn login(&self, tenant_id: &str) -> Result<Token, AuthError> {
        // Built and dropped here, on the login thread: the blocking client owns a runtime.
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let code = self.request_code(&client, tenant_id)?;
        let message = code.message.clone().unwrap_or_else(|| {
            format!(
                "To sign in, open {} and enter the code {}.",
                code.verification_url, code.user_code
            )
        });
        (self.notify)(&message);

        let lifetime = code
            .expires_in
            .unwrap_or(DEFAULT_DEVICE_CODE_LIFETIME_SECS)
            .min(MAX_DEVICE_CODE_LIFETIME_SECS);
        let deadline = Instant::now() + Duration::from_secs(lifetime);
        let max_interval = Duration::from_secs(MAX_POLL_INTERVAL_SECS);
        let mut interval = Duration::from_secs(
            code.interval
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
                .min(MAX_POLL_INTERVAL_SECS),
        );
        let token_endpoint = self.settings.token_endpoint(tenant_id)?;

        loop {
            if Instant::now() >= deadline {
                return Err(AuthError::CodeExpired);
            }
            thread::sleep(interval);

            let response = client
                .post(token_endpoint.clone())
                .form(&[
                    ("grant_type", "device_code"),
                    ("client_id", self.settings.client_id.as_str()),
                    ("resource", self.settings.resource.as_str()),
                    ("code", code.device_code.as_str()),
                ])
                .send()?;
            let status = response.status();
            let body = response.text()?;

            match parse_token_body(status, &body, tenant_id) {
                Ok(token) => return Ok(token),
                Err(AuthError::Rejected { code, description }) => {
                    if code == "authorization_pending" {
                        log::trace!("Waiting for the user to sign in");
                    } else if code == "slow_down" {
                        interval = (interval + Duration::from_secs(SLOW_DOWN_STEP_SECS)).min(max_interval);
                        log::debug!("Authority asked to slow down; polling every {:?}", interval);
                    } else if code == "expired_token" || code == "code_expired" {
                        return Err(AuthError::CodeExpired);
                    } else if code == "authorization_declined" || code == "access_denied" {
                        return Err(AuthError::Denied { reason: description });
                    } else {
                        return Err(AuthError::Rejected { code, description });
                    }
                }
                Err(other) => return Err(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_endpoints() {
        let settings = OAuthSettings::default();
        assert_eq!(
            settings.token_endpoint("contoso.onmicrosoft.com").unwrap().as_str(),
            "https://login.microsoftonline.com/contoso.onmicrosoft.com/oauth2/token"
        );

        let custom = OAuthSettings {
            authority: Url::parse("http://127.0.0.1:9999/auth").unwrap(),
            ..OAuthSettings::default()
        };
        assert_eq!(
            custom.device_code_endpoint("t1").unwrap().as_str(),
            "http://127.0.0.1:9999/auth/t1/oauth2/devicecode"
        );
    }

    #[test]
    fn test_token_response_accepts_string_numbers() {
        let body = r#"{"access_token":"a","refresh_token":"r","expires_in":"3599","token_type":"Bearer"}"#;
        let token = parse_token_body(reqwest::StatusCode::OK, body, "t1").unwrap();
        assert_eq!(token.tenant_id, "t1");
        assert_eq!(token.refresh_token.as_deref(), Some("r"));
        let remaining = token.expires_on - Utc::now();
        assert!(remaining > ChronoDuration::seconds(3500) && remaining <= ChronoDuration::seconds(3599));
    }

    #[test]
    fn test_error_body_maps_to_rejected() {
        let body = r#"{"error":"invalid_grant","error_description":"AADSTS70008: expired"}"#;
        match parse_token_body(reqwest::StatusCode::BAD_REQUEST, body, "t1") {
            Err(AuthError::Rejected { code, description }) => {
                assert_eq!(code, "invalid_grant");
                assert!(description.contains("expired"));
            }
            other => panic!("unexpected: {:?}", other),
        }

        let garbage = parse_token_body(reqwest::StatusCode::BAD_GATEWAY, "<html>", "t1");
        assert!(matches!(garbage, Err(AuthError::Protocol(_))));
    }
}
