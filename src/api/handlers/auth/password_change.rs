//! Password change for authenticated users.
//!
//! The caller proves possession of the current password, the hash is rotated,
//! and every other session is revoked; the current session survives so the
//! account does not lock itself out mid-change.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

use super::{
    error::AuthFailure,
    password::{hash_password, verify_password},
    principal::require_auth,
    state::AuthState,
    storage::{lookup_account_by_id, revoke_all_sessions, update_password_hash},
    types::PasswordChangeRequest,
    utils::{unix_now, valid_password},
};

#[utoipa::path(
    post,
    path = "/v1/auth/password",
    request_body = PasswordChangeRequest,
    responses(
        (status = 204, description = "Password updated; other sessions revoked"),
        (status = 400, description = "Validation error", body = super::error::ErrorBody),
        (status = 401, description = "Missing credentials or wrong current password", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn change_password(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<PasswordChangeRequest>>,
) -> Result<Response, AuthFailure> {
    let principal = require_auth(&headers, &pool, &auth_state).await?;

    let Some(Json(request)) = payload else {
        return Err(AuthFailure::BadRequest("Missing payload"));
    };
    if !valid_password(&request.new_password) {
        return Err(AuthFailure::BadRequest(
            "Password must be at least 8 characters and contain a letter and a digit",
        ));
    }

    // Re-check the current password even on an authenticated session: a
    // stolen token alone must not be enough to take over the account.
    let account = lookup_account_by_id(&pool, principal.account_id)
        .await?
        .ok_or(AuthFailure::SessionRevoked)?;
    if !verify_password(request.current_password, account.password_hash).await? {
        return Err(AuthFailure::InvalidCredentials);
    }

    let password_hash = hash_password(request.new_password).await?;
    update_password_hash(&pool, principal.account_id, &password_hash, unix_now()).await?;

    let revoked =
        revoke_all_sessions(&pool, principal.account_id, Some(&principal.session_hash)).await?;
    info!(
        "password changed for {}; {revoked} other session(s) revoked",
        principal.account_id
    );

    Ok(StatusCode::NO_CONTENT.into_response())
}
