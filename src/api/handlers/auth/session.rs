//! Session endpoints for cookie and bearer auth.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, InvalidHeaderValue, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::error;

use super::{
    error::AuthFailure,
    principal::require_auth,
    roles::{PermissionSet, Role},
    state::{AuthConfig, AuthState},
    storage::{insert_session, revoke_all_sessions, revoke_session},
    types::{AccountResponse, AuthResponse, SessionResponse},
    utils::{hash_opaque_token, unix_now},
};
use uuid::Uuid;

const SESSION_COOKIE_NAME: &str = "aula_session";

/// Create a session for a freshly authenticated account and build the
/// response carrying the signed token, both as JSON and as a cookie.
///
/// Used by register and login; `remember` selects the long-lived tier.
pub(super) async fn establish_session(
    pool: &SqlitePool,
    auth_state: &AuthState,
    account_id: Uuid,
    email: &str,
    role: Role,
    permissions: PermissionSet,
    remember: bool,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
    status: StatusCode,
) -> Result<Response, AuthFailure> {
    let config = auth_state.config();
    let ttl_seconds = if remember {
        config.remember_token_ttl_seconds()
    } else {
        config.token_ttl_seconds()
    };

    let session_token =
        insert_session(pool, account_id, ttl_seconds, ip_address, user_agent, unix_now()).await?;
    let token = auth_state
        .tokens()
        .issue(account_id, email, role, &session_token, ttl_seconds)?;

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = auth_cookie(config, &token, ttl_seconds) {
        response_headers.insert(SET_COOKIE, cookie);
    }

    let body = AuthResponse {
        token,
        account: AccountResponse {
            id: account_id.to_string(),
            email: email.to_string(),
            role,
            permissions,
        },
    };
    Ok((status, response_headers, Json(body)).into_response())
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    // Anything short of an infrastructure failure is "no session" so this
    // endpoint does not leak why a token stopped working.
    match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => {
            let response = SessionResponse {
                account_id: principal.account_id.to_string(),
                email: principal.email,
                role: principal.role,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(AuthFailure::Internal) => AuthFailure::Internal.into_response(),
        Err(_) => StatusCode::NO_CONTENT.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    // Logout is idempotent: revoke when the token resolves, succeed either way.
    if let Some(token) = extract_request_token(&headers)
        && let Ok(claims) = auth_state.tokens().verify(&token)
    {
        let token_hash = hash_opaque_token(&claims.sid);
        if let Err(err) = revoke_session(&pool, &token_hash).await {
            error!("Failed to revoke session: {err}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_auth_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout-all",
    responses(
        (status = 204, description = "All sessions for the account revoked"),
        (status = 401, description = "Missing or invalid credentials", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn logout_all(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, AuthFailure> {
    let principal = require_auth(&headers, &pool, &auth_state).await?;

    revoke_all_sessions(&pool, principal.account_id, None).await?;

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_auth_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    Ok((StatusCode::NO_CONTENT, response_headers).into_response())
}

/// Build a secure `HttpOnly` cookie carrying the bearer token.
pub(super) fn auth_cookie(
    config: &AuthConfig,
    token: &str,
    ttl_seconds: i64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    // Only mark cookies secure when the frontend is served over HTTPS.
    let secure = config.session_cookie_secure();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_auth_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = config.session_cookie_secure();
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Pull the bearer token from the `Authorization` header or the session
/// cookie, in that order.
pub(crate) fn extract_request_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
