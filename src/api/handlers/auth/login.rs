//! Login flow: rate limits, progressive delay, lockout, then credentials.
//!
//! Ordering is load-bearing:
//!
//! - rate limits run first so a flood never reaches the slow hash;
//! - the lock state is checked before the password, so a locked account
//!   reveals nothing about whether the password was right;
//! - a failed check and the lock escalation are one atomic counter update.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{
    error::AuthFailure,
    password::verify_password,
    rate_limit::{RateBucket, RateKey, RateLimitDecision},
    session::establish_session,
    state::AuthState,
    storage::{clear_login_failures, lookup_account_by_email, record_failed_login},
    types::LoginRequest,
    utils::{extract_client_ip, extract_user_agent, normalize_email, unix_now, valid_email},
};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login success", body = super::types::AuthResponse),
        (status = 400, description = "Validation error", body = super::error::ErrorBody),
        (status = 401, description = "Invalid credentials", body = super::error::ErrorBody),
        (status = 423, description = "Account locked", body = super::error::ErrorBody),
        (status = 429, description = "Rate limited", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Response, AuthFailure> {
    let Some(Json(request)) = payload else {
        return Err(AuthFailure::BadRequest("Missing payload"));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(AuthFailure::BadRequest("Invalid email"));
    }

    let client_ip = extract_client_ip(&headers);
    let ip_key = RateKey::Ip(client_ip.clone().unwrap_or_else(|| "unknown".to_string()));
    let email_key = RateKey::Email(email.clone());

    let limiter = auth_state.rate_limiter();
    if let RateLimitDecision::Limited { retry_after } =
        limiter.check(RateBucket::Auth, &ip_key, None)
    {
        return Err(AuthFailure::RateLimited { retry_after });
    }
    // Pre-lookup throttle per raw email: counts attempts whether or not the
    // account exists, so stuffing unknown addresses is slowed too.
    if let RateLimitDecision::Limited { retry_after } =
        limiter.check(RateBucket::LoginEmail, &email_key, None)
    {
        return Err(AuthFailure::RateLimited { retry_after });
    }

    // Soft friction: past the soft threshold each attempt waits a little
    // longer before any credential work happens.
    let delay = limiter.throttle_delay(RateBucket::Auth, &ip_key);
    if delay > Duration::ZERO {
        debug!("throttling login from {ip_key:?} by {delay:?}");
        tokio::time::sleep(delay).await;
    }

    let Some(account) = lookup_account_by_email(&pool, &email).await? else {
        return Err(AuthFailure::InvalidCredentials);
    };

    if !account.active {
        return Err(AuthFailure::AccountInactive);
    }

    // A locked account rejects before the password is checked, so the
    // response cannot leak whether the password was right.
    let now = unix_now();
    if let Some(until) = account.locked_until
        && until > now
    {
        return Err(AuthFailure::AccountLocked {
            retry_after: Duration::from_secs(until.saturating_sub(now).unsigned_abs()),
        });
    }

    let verified = verify_password(request.password, account.password_hash.clone()).await?;
    if !verified {
        let config = auth_state.config();
        let state = record_failed_login(
            &pool,
            account.id,
            config.lockout_threshold(),
            config.lockout_duration_seconds(),
            now,
        )
        .await?;
        if state.locked_until.is_some() {
            info!("account locked after repeated failures: {}", account.id);
        }
        // The attempt that trips the lock still reads as bad credentials;
        // the lock surfaces on the next request.
        return Err(AuthFailure::InvalidCredentials);
    }

    if account.failed_attempts > 0 || account.locked_until.is_some() {
        clear_login_failures(&pool, account.id, now).await?;
    }

    establish_session(
        &pool,
        &auth_state,
        account.id,
        &account.email,
        account.role,
        account.permissions,
        request.remember.unwrap_or(false),
        client_ip.as_deref(),
        extract_user_agent(&headers).as_deref(),
        StatusCode::OK,
    )
    .await
}
