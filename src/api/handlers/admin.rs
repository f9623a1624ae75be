//! Administrative account listing.

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
    principal::{require_auth, require_permission, require_role},
    rate_limit::{RateBucket, RateKey, RateLimitDecision},
    roles::{Permission, Role},
    state::AuthState,
    storage::list_accounts,
    types::AccountSummaryResponse,
};

#[utoipa::path(
    get,
    path = "/v1/admin/accounts",
    responses(
        (status = 200, description = "All accounts with their lock state", body = [AccountSummaryResponse]),
        (status = 401, description = "Missing or invalid credentials", body = super::auth::error::ErrorBody),
        (status = 403, description = "Insufficient role or missing permission", body = super::auth::error::ErrorBody)
    ),
    tag = "admin"
)]
pub async fn accounts(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, AuthFailure> {
    let principal = require_auth(&headers, &pool, &auth_state).await?;
    // Instructors may be granted account management explicitly; admins pass
    // the permission check by role.
    require_role(&principal, Role::Instructor)?;
    require_permission(&principal, Permission::ManageAccounts)?;

    // Admins bypass the tier entirely; the check stays in the path so the
    // decision is the limiter's, not this handler's.
    let key = RateKey::Account(principal.account_id);
    if let RateLimitDecision::Limited { retry_after } =
        auth_state
            .rate_limiter()
            .check(RateBucket::Api, &key, Some(principal.role))
    {
        return Err(AuthFailure::RateLimited { retry_after });
    }

    let accounts = list_accounts(&pool).await?;
    let body: Vec<AccountSummaryResponse> = accounts
        .into_iter()
        .map(|summary| AccountSummaryResponse {
            id: summary.id.to_string(),
            email: summary.email,
            role: summary.role,
            active: summary.active,
            failed_attempts: summary.failed_attempts,
            created_at: summary.created_at,
        })
        .collect();

    Ok((StatusCode::OK, Json(body)).into_response())
}
