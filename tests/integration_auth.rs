//! End-to-end flows through the assembled router against in-memory SQLite.

use anyhow::{Context, Result};
use aula::api;
use aula::api::handlers::auth::{
    AuthConfig, AuthState, RateLimitSettings, ResetMailer, SlidingWindowLimiter, TokenService,
    roles::Role,
};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Request, StatusCode, header},
};
use secrecy::SecretString;
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";

/// Mailer that captures reset tokens instead of delivering them.
#[derive(Default)]
struct CaptureMailer {
    handoffs: Mutex<Vec<(String, String)>>,
}

impl CaptureMailer {
    fn take(&self) -> Vec<(String, String)> {
        let mut guard = self.handoffs.lock().expect("mailer lock");
        std::mem::take(&mut *guard)
    }
}

impl ResetMailer for CaptureMailer {
    fn send_reset(&self, email: &str, token: &str) {
        self.handoffs
            .lock()
            .expect("mailer lock")
            .push((email.to_string(), token.to_string()));
    }
}

struct TestApp {
    app: Router,
    pool: SqlitePool,
    mailer: Arc<CaptureMailer>,
}

/// Roomy limits so functional tests neither trip the limiter nor sleep in
/// the progressive-delay throttle.
fn roomy_limits() -> RateLimitSettings {
    let mut settings = RateLimitSettings::default();
    settings.auth.max = 1_000;
    settings.login_email.max = 1_000;
    settings.password_reset.max = 1_000;
    settings.soft_threshold = 1_000;
    settings
}

async fn test_app_with(settings: RateLimitSettings) -> Result<TestApp> {
    // One connection keeps every pool handle on the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
        .await
        .context("failed to open in-memory database")?;
    api::prepare_database(&pool).await?;

    let config = AuthConfig::new("http://localhost:3000".to_string()).with_rate_limits(settings);
    let rate_limiter = Arc::new(SlidingWindowLimiter::new(config.rate_limits().clone()));
    let mailer = Arc::new(CaptureMailer::default());
    let auth_state = Arc::new(AuthState::new(
        config,
        TokenService::new(&SecretString::from(TEST_SECRET.to_string())),
        rate_limiter,
        mailer.clone(),
    ));

    let app = api::app(pool.clone(), auth_state)?;
    Ok(TestApp { app, pool, mailer })
}

async fn test_app() -> Result<TestApp> {
    test_app_with(roomy_limits()).await
}

async fn send(
    app: &Router,
    method: &str,
    path: &str,
    ip: &str,
    bearer: Option<&str>,
    body: Option<serde_json::Value>,
) -> Result<(StatusCode, serde_json::Value, HeaderMap)> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("x-forwarded-for", ip);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    let request = match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&value)?))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    Ok((status, value, headers))
}

fn register_body(email: &str, password: &str) -> serde_json::Value {
    serde_json::json!({ "email": email, "password": password })
}

async fn register(app: &Router, email: &str, password: &str) -> Result<String> {
    let (status, body, _) = send(
        app,
        "POST",
        "/v1/auth/register",
        "10.1.1.1",
        None,
        Some(register_body(email, password)),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    body["token"]
        .as_str()
        .map(str::to_string)
        .context("register response missing token")
}

#[tokio::test]
async fn health_reports_database_ok() -> Result<()> {
    let harness = test_app().await?;
    let (status, body, headers) = send(&harness.app, "GET", "/health", "10.1.1.1", None, None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "ok");
    assert!(headers.contains_key("X-App"));
    Ok(())
}

#[tokio::test]
async fn register_then_me_flow() -> Result<()> {
    let harness = test_app().await?;
    let token = register(&harness.app, "a@x.com", "Aa1!aaaa").await?;

    let (status, body, _) = send(&harness.app, "GET", "/v1/me", "10.1.1.1", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "a@x.com");
    assert_eq!(body["role"], "learner");

    // The same address cannot be registered twice.
    let (status, body, _) = send(
        &harness.app,
        "POST",
        "/v1/auth/register",
        "10.1.1.1",
        None,
        Some(register_body("A@X.com", "Bb2!bbbb")),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "duplicate_email");
    Ok(())
}

#[tokio::test]
async fn register_validates_input() -> Result<()> {
    let harness = test_app().await?;

    let (status, _, _) = send(
        &harness.app,
        "POST",
        "/v1/auth/register",
        "10.1.1.1",
        None,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body, _) = send(
        &harness.app,
        "POST",
        "/v1/auth/register",
        "10.1.1.1",
        None,
        Some(register_body("not-an-email", "Aa1!aaaa")),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_request");

    let (status, _, _) = send(
        &harness.app,
        "POST",
        "/v1/auth/register",
        "10.1.1.1",
        None,
        Some(register_body("a@x.com", "short1")),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn repeated_failures_lock_until_expiry_then_reset() -> Result<()> {
    let harness = test_app().await?;
    register(&harness.app, "a@x.com", "Aa1!aaaa").await?;

    // Five wrong passwords drive the counter to the threshold.
    for attempt in 1..=5 {
        let (status, body, _) = send(
            &harness.app,
            "POST",
            "/v1/auth/login",
            "10.1.1.1",
            None,
            Some(register_body("a@x.com", "Wrong1!aa")),
        )
        .await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "attempt {attempt}: {body}");
        assert_eq!(body["error_code"], "invalid_credentials");
    }

    // The sixth attempt is rejected as locked even with the right password,
    // before the password is checked.
    let (status, body, headers) = send(
        &harness.app,
        "POST",
        "/v1/auth/login",
        "10.1.1.1",
        None,
        Some(register_body("a@x.com", "Aa1!aaaa")),
    )
    .await?;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(body["error_code"], "account_locked");
    let retry_after: u64 = headers
        .get(header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .context("423 must carry Retry-After")?;
    assert!(retry_after > 0 && retry_after <= 30 * 60);

    // Rewind the lock as if the duration elapsed.
    sqlx::query("UPDATE accounts SET locked_until = 1 WHERE email = $1")
        .bind("a@x.com")
        .execute(&harness.pool)
        .await?;

    let (status, body, _) = send(
        &harness.app,
        "POST",
        "/v1/auth/login",
        "10.1.1.1",
        None,
        Some(register_body("a@x.com", "Aa1!aaaa")),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "login after lock expiry: {body}");

    // Success resets the state machine.
    let row = sqlx::query("SELECT failed_attempts, locked_until FROM accounts WHERE email = $1")
        .bind("a@x.com")
        .fetch_one(&harness.pool)
        .await?;
    assert_eq!(row.get::<i64, _>("failed_attempts"), 0);
    assert_eq!(row.get::<Option<i64>, _>("locked_until"), None);
    Ok(())
}

#[tokio::test]
async fn expired_token_is_rejected_as_expired() -> Result<()> {
    let harness = test_app().await?;
    register(&harness.app, "a@x.com", "Aa1!aaaa").await?;

    // Same signing secret, but exp already in the past; the signature check
    // happens before any session lookup, so the sid does not matter.
    let tokens = TokenService::new(&SecretString::from(TEST_SECRET.to_string()));
    let expired = tokens.issue_at(
        Uuid::new_v4(),
        "a@x.com",
        Role::Learner,
        "sid",
        1,
        chrono::Utc::now().timestamp() - 120,
    )?;

    let (status, body, _) = send(&harness.app, "GET", "/v1/me", "10.1.1.1", Some(&expired), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "token_expired");
    Ok(())
}

#[tokio::test]
async fn garbage_token_is_rejected_as_invalid() -> Result<()> {
    let harness = test_app().await?;
    let (status, body, _) = send(
        &harness.app,
        "GET",
        "/v1/me",
        "10.1.1.1",
        Some("garbage.token.here"),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "token_invalid");
    Ok(())
}

#[tokio::test]
async fn logout_revokes_the_session_behind_a_valid_token() -> Result<()> {
    let harness = test_app().await?;
    let token = register(&harness.app, "a@x.com", "Aa1!aaaa").await?;

    let (status, _, _) = send(
        &harness.app,
        "POST",
        "/v1/auth/logout",
        "10.1.1.1",
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // The token still carries a valid signature; the dead session kills it.
    let (status, body, _) = send(&harness.app, "GET", "/v1/me", "10.1.1.1", Some(&token), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "session_revoked");

    let (status, _, _) = send(
        &harness.app,
        "GET",
        "/v1/auth/session",
        "10.1.1.1",
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    Ok(())
}

#[tokio::test]
async fn login_rate_limit_rejects_the_sixth_call_per_ip() -> Result<()> {
    // Default tiers: the auth bucket allows 5 per 15 minutes per IP.
    let harness = test_app_with(RateLimitSettings::default()).await?;

    for attempt in 1..=5 {
        let (status, _, _) = send(
            &harness.app,
            "POST",
            "/v1/auth/login",
            "9.9.9.9",
            None,
            Some(register_body("ghost@x.com", "Aa1!aaaa")),
        )
        .await?;
        assert_eq!(
            status,
            StatusCode::UNAUTHORIZED,
            "attempt {attempt} should reach the credential check"
        );
    }

    let (status, body, headers) = send(
        &harness.app,
        "POST",
        "/v1/auth/login",
        "9.9.9.9",
        None,
        Some(register_body("ghost@x.com", "Aa1!aaaa")),
    )
    .await?;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error_code"], "rate_limited");
    let retry_after: u64 = headers
        .get(header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .context("429 must carry Retry-After")?;
    assert!(retry_after > 0 && retry_after <= 15 * 60);

    // A different IP is still welcome.
    let (status, _, _) = send(
        &harness.app,
        "POST",
        "/v1/auth/login",
        "9.9.9.10",
        None,
        Some(register_body("ghost@x.com", "Aa1!aaaa")),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn reset_flow_is_single_use_and_revokes_sessions() -> Result<()> {
    let harness = test_app().await?;
    let token = register(&harness.app, "a@x.com", "Aa1!aaaa").await?;

    // Unknown addresses get the identical answer and no mail handoff.
    let (status, unknown_body, _) = send(
        &harness.app,
        "POST",
        "/v1/auth/reset/request",
        "10.1.1.1",
        None,
        Some(serde_json::json!({ "email": "ghost@x.com" })),
    )
    .await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(harness.mailer.take().is_empty());

    let (status, known_body, _) = send(
        &harness.app,
        "POST",
        "/v1/auth/reset/request",
        "10.1.1.1",
        None,
        Some(serde_json::json!({ "email": "a@x.com" })),
    )
    .await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(unknown_body, known_body);

    let handoffs = harness.mailer.take();
    let (email, reset_token) = handoffs.first().context("reset token should be issued")?;
    assert_eq!(email, "a@x.com");

    let (status, _, _) = send(
        &harness.app,
        "POST",
        "/v1/auth/reset/confirm",
        "10.1.1.1",
        None,
        Some(serde_json::json!({ "token": reset_token, "new_password": "Cc3!cccc" })),
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // The reset revoked every live session.
    let (status, body, _) = send(&harness.app, "GET", "/v1/me", "10.1.1.1", Some(&token), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "session_revoked");

    // Old password is gone, new one works.
    let (status, _, _) = send(
        &harness.app,
        "POST",
        "/v1/auth/login",
        "10.1.1.1",
        None,
        Some(register_body("a@x.com", "Aa1!aaaa")),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _, _) = send(
        &harness.app,
        "POST",
        "/v1/auth/login",
        "10.1.1.1",
        None,
        Some(register_body("a@x.com", "Cc3!cccc")),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    // The token was consumed atomically; replay fails.
    let (status, body, _) = send(
        &harness.app,
        "POST",
        "/v1/auth/reset/confirm",
        "10.1.1.1",
        None,
        Some(serde_json::json!({ "token": reset_token, "new_password": "Dd4!dddd" })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "reset_token_invalid_or_expired");
    Ok(())
}

#[tokio::test]
async fn role_guard_denies_learner_and_admits_admin() -> Result<()> {
    let harness = test_app().await?;
    let token = register(&harness.app, "a@x.com", "Aa1!aaaa").await?;

    let (status, body, _) = send(
        &harness.app,
        "GET",
        "/v1/admin/accounts",
        "10.1.1.1",
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "insufficient_role");

    // Promotion takes effect on the next request; role is read from the
    // store, not from the token's claims.
    sqlx::query("UPDATE accounts SET role = 'admin' WHERE email = $1")
        .bind("a@x.com")
        .execute(&harness.pool)
        .await?;

    let (status, body, _) = send(
        &harness.app,
        "GET",
        "/v1/admin/accounts",
        "10.1.1.1",
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let listed = body.as_array().context("admin listing should be an array")?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["email"], "a@x.com");
    Ok(())
}

#[tokio::test]
async fn permission_guard_is_default_deny_with_explicit_grants() -> Result<()> {
    let harness = test_app().await?;
    let token = register(&harness.app, "i@x.com", "Aa1!aaaa").await?;

    // Role floor passes for an instructor, but the permission is still
    // missing: default deny.
    sqlx::query("UPDATE accounts SET role = 'instructor' WHERE email = $1")
        .bind("i@x.com")
        .execute(&harness.pool)
        .await?;
    let (status, body, _) = send(
        &harness.app,
        "GET",
        "/v1/admin/accounts",
        "10.1.1.1",
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "permission_denied");

    // An explicit grant admits the instructor.
    sqlx::query(r#"UPDATE accounts SET permissions = '["manage_accounts"]' WHERE email = $1"#)
        .bind("i@x.com")
        .execute(&harness.pool)
        .await?;
    let (status, _, _) = send(
        &harness.app,
        "GET",
        "/v1/admin/accounts",
        "10.1.1.1",
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn password_change_keeps_current_session_and_drops_the_rest() -> Result<()> {
    let harness = test_app().await?;
    let first = register(&harness.app, "a@x.com", "Aa1!aaaa").await?;

    let (status, body, _) = send(
        &harness.app,
        "POST",
        "/v1/auth/login",
        "10.1.1.1",
        None,
        Some(register_body("a@x.com", "Aa1!aaaa")),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let second = body["token"].as_str().context("login token")?.to_string();

    // Changing the password requires the current one, even on a valid session.
    let (status, body, _) = send(
        &harness.app,
        "POST",
        "/v1/auth/password",
        "10.1.1.1",
        Some(&first),
        Some(serde_json::json!({ "current_password": "Nope1!aa", "new_password": "Bb2!bbbb" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "{body}");

    let (status, _, _) = send(
        &harness.app,
        "POST",
        "/v1/auth/password",
        "10.1.1.1",
        Some(&first),
        Some(serde_json::json!({ "current_password": "Aa1!aaaa", "new_password": "Bb2!bbbb" })),
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // The changing session survives; the other one is revoked.
    let (status, _, _) = send(&harness.app, "GET", "/v1/me", "10.1.1.1", Some(&first), None).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, body, _) = send(&harness.app, "GET", "/v1/me", "10.1.1.1", Some(&second), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "session_revoked");

    let (status, _, _) = send(
        &harness.app,
        "POST",
        "/v1/auth/login",
        "10.1.1.1",
        None,
        Some(register_body("a@x.com", "Bb2!bbbb")),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn deactivated_account_is_rejected_even_with_a_live_session() -> Result<()> {
    let harness = test_app().await?;
    let token = register(&harness.app, "a@x.com", "Aa1!aaaa").await?;

    sqlx::query("UPDATE accounts SET active = 0 WHERE email = $1")
        .bind("a@x.com")
        .execute(&harness.pool)
        .await?;

    let (status, body, _) = send(&harness.app, "GET", "/v1/me", "10.1.1.1", Some(&token), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "account_inactive");

    let (status, body, _) = send(
        &harness.app,
        "POST",
        "/v1/auth/login",
        "10.1.1.1",
        None,
        Some(register_body("a@x.com", "Aa1!aaaa")),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "account_inactive");
    Ok(())
}

#[tokio::test]
async fn locked_account_rejects_a_valid_token() -> Result<()> {
    let harness = test_app().await?;
    let token = register(&harness.app, "a@x.com", "Aa1!aaaa").await?;

    let lock_until = chrono::Utc::now().timestamp() + 600;
    sqlx::query("UPDATE accounts SET failed_attempts = 5, locked_until = $1 WHERE email = $2")
        .bind(lock_until)
        .bind("a@x.com")
        .execute(&harness.pool)
        .await?;

    let (status, body, headers) =
        send(&harness.app, "GET", "/v1/me", "10.1.1.1", Some(&token), None).await?;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(body["error_code"], "account_locked");
    assert!(headers.contains_key(header::RETRY_AFTER));
    Ok(())
}
