//! Profile endpoint for the authenticated principal.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use sqlx::SqlitePool;
use std::sync::Arc;

use super::auth::{
    error::AuthFailure,
    principal::{require_auth, require_role},
    rate_limit::{RateBucket, RateKey, RateLimitDecision},
    roles::Role,
    state::AuthState,
    types::AccountResponse,
};

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Authenticated account profile", body = AccountResponse),
        (status = 401, description = "Missing or invalid credentials", body = super::auth::error::ErrorBody),
        (status = 403, description = "Insufficient role", body = super::auth::error::ErrorBody),
        (status = 429, description = "Rate limited", body = super::auth::error::ErrorBody)
    ),
    tag = "me"
)]
pub async fn me(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, AuthFailure> {
    let principal = require_auth(&headers, &pool, &auth_state).await?;
    require_role(&principal, Role::Learner)?;

    // Authenticated traffic keys on the account, not the caller IP, and the
    // role picks the tier.
    let key = RateKey::Account(principal.account_id);
    if let RateLimitDecision::Limited { retry_after } =
        auth_state
            .rate_limiter()
            .check(RateBucket::Api, &key, Some(principal.role))
    {
        return Err(AuthFailure::RateLimited { retry_after });
    }

    let body = AccountResponse {
        id: principal.account_id.to_string(),
        email: principal.email,
        role: principal.role,
        permissions: principal.permissions,
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}
