// tests/oauth_http.rs

use chrono::{Duration, Utc};
use nuops::auth::oauth::{DeviceCodeLogin, HttpRefresher, OAuthSettings};
use nuops::auth::{AuthError, InteractiveLogin, SilentRefresh, Token, TokenCache, TokenManager};
use nuops::system::affinity::run_on_login_thread;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TENANT: &str = "contoso.onmicrosoft.com";

fn settings(server: &MockServer) -> OAuthSettings {
    OAuthSettings {
        authority: Url::parse(&server.uri()).unwrap(),
        ..OAuthSettings::default()
    }
}

async fn mount_device_code(server: &MockServer) {
    mount_device_code_expiring(server, "60").await;
}

async fn mount_device_code_expiring(server: &MockServer, expires_in: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/oauth2/devicecode")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "dev-123",
            "user_code": "ABCD-EFGH",
            "verification_url": "https://microsoft.com/devicelogin",
            "expires_in": expires_in,
            "interval": "0"
        })))
        .mount(server)
        .await;
}

async fn mount_token_error(server: &MockServer, code: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/oauth2/token")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": code })))
        .mount(server)
        .await;
}

async fn mount_signed_in(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/oauth2/token")))
        .and(body_string_contains("grant_type=device_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "signed-in",
            "expires_in": 3600
        })))
        .mount(server)
        .await;
}

/// Runs a device-code login where it belongs: on the dedicated login thread.
async fn device_login(server: &MockServer) -> Result<Token, AuthError> {
    let login = DeviceCodeLogin::with_notifier(settings(server), |_| {});
    run_on_login_thread(move || login.login(TENANT)).await.unwrap()
}

#[tokio::test]
async fn test_refresher_exchanges_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/oauth2/token")))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh",
            "refresh_token": "r-2",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let refresher = HttpRefresher::new(settings(&server)).unwrap();
    let token = refresher.refresh(TENANT, "r-1").await.unwrap();

    assert_eq!(token.access_token, "fresh");
    assert_eq!(token.refresh_token.as_deref(), Some("r-2"));
    assert!(!token.needs_refresh_at(Utc::now()));
}

#[tokio::test]
async fn test_refresher_surfaces_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/oauth2/token")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "refresh token revoked"
        })))
        .mount(&server)
        .await;

    let refresher = HttpRefresher::new(settings(&server)).unwrap();
    let err = refresher.refresh(TENANT, "r-1").await.unwrap_err();
    assert!(matches!(err, AuthError::Rejected { ref code, .. } if code == "invalid_grant"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_device_code_login_polls_until_signed_in() {
    let server = MockServer::start().await;
    mount_device_code(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/oauth2/token")))
        .and(body_string_contains("grant_type=device_code"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "authorization_pending" })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/oauth2/token")))
        .and(body_string_contains("code=dev-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "signed-in",
            "refresh_token": "r-1",
            "expires_in": "3599"
        })))
        .mount(&server)
        .await;

    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&messages);
    let login = DeviceCodeLogin::with_notifier(settings(&server), move |m| sink.lock().unwrap().push(m.to_string()));

    let dir = TempDir::new().unwrap();
    let manager = TokenManager::new(
        TokenCache::new(dir.path()),
        Arc::new(login),
        Arc::new(HttpRefresher::new(settings(&server)).unwrap()),
    );

    let token = manager.token_for(TENANT).await.unwrap().unwrap();
    assert_eq!(token.access_token, "signed-in");
    assert_eq!(token.tenant_id, TENANT);
    assert_eq!(manager.cached(TENANT).await.unwrap(), Some(token));

    let messages = messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("ABCD-EFGH"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_declined_login_yields_no_token() {
    let server = MockServer::start().await;
    mount_device_code(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/oauth2/token")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "authorization_declined",
            "error_description": "The user declined"
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let manager = TokenManager::with_oauth(TokenCache::new(dir.path()), settings(&server)).unwrap();

    assert_eq!(manager.get_token(TENANT).await.unwrap(), None);
    assert_eq!(manager.cached(TENANT).await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_revoked_refresh_falls_back_to_device_code() {
    let server = MockServer::start().await;
    mount_device_code(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/oauth2/token")))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/oauth2/token")))
        .and(body_string_contains("grant_type=device_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "after-login",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let cache = TokenCache::new(dir.path());
    let expiring = Token::new(TENANT, "old", Some("revoked".into()), Utc::now() + Duration::seconds(10));
    cache.store(&expiring).await.unwrap();

    let login = DeviceCodeLogin::with_notifier(settings(&server), |_| {});
    let manager = TokenManager::new(
        cache,
        Arc::new(login),
        Arc::new(HttpRefresher::new(settings(&server)).unwrap()),
    );

    let token = manager.token_for(TENANT).await.unwrap().unwrap();
    assert_eq!(token.access_token, "after-login");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_down_widens_the_poll_interval() {
    let server = MockServer::start().await;
    mount_device_code(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/oauth2/token")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "slow_down" })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_signed_in(&server).await;

    let started = Instant::now();
    let token = device_login(&server).await.unwrap();

    assert_eq!(token.access_token, "signed-in");
    // The advertised interval is 0s; only the slow_down step can account for the wait.
    assert!(started.elapsed() >= std::time::Duration::from_secs(5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_expired_code_stops_polling() {
    let server = MockServer::start().await;
    mount_device_code(&server).await;
    mount_token_error(&server, "expired_token").await;

    assert!(matches!(device_login(&server).await, Err(AuthError::CodeExpired)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_code_expired_error_stops_polling() {
    let server = MockServer::start().await;
    mount_device_code(&server).await;
    mount_token_error(&server, "code_expired").await;

    assert!(matches!(device_login(&server).await, Err(AuthError::CodeExpired)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deadline_ends_login_without_polling() {
    let server = MockServer::start().await;
    mount_device_code_expiring(&server, "0").await;
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/oauth2/token")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "authorization_pending" })))
        .expect(0)
        .mount(&server)
        .await;

    assert!(matches!(device_login(&server).await, Err(AuthError::CodeExpired)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_oversized_code_lifetime_is_capped() {
    let server = MockServer::start().await;
    mount_device_code_expiring(&server, "18446744073709551615").await;
    mount_signed_in(&server).await;

    let token = device_login(&server).await.unwrap();
    assert_eq!(token.access_token, "signed-in");
}
