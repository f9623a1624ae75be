//! Account registration.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

use super::{
    error::AuthFailure,
    rate_limit::{RateBucket, RateKey, RateLimitDecision},
    roles::{PermissionSet, Role},
    session::establish_session,
    state::AuthState,
    storage::{RegisterOutcome, insert_account},
    types::RegisterRequest,
    utils::{
        extract_client_ip, extract_user_agent, normalize_email, unix_now, valid_email,
        valid_password,
    },
};
use super::password::hash_password;

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created and logged in", body = super::types::AuthResponse),
        (status = 400, description = "Validation error", body = super::error::ErrorBody),
        (status = 409, description = "Email already registered", body = super::error::ErrorBody),
        (status = 429, description = "Rate limited", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<Response, AuthFailure> {
    let Some(Json(request)) = payload else {
        return Err(AuthFailure::BadRequest("Missing payload"));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(AuthFailure::BadRequest("Invalid email"));
    }
    if !valid_password(&request.password) {
        return Err(AuthFailure::BadRequest(
            "Password must be at least 8 characters and contain a letter and a digit",
        ));
    }

    let client_ip = extract_client_ip(&headers);
    let ip_key = RateKey::Ip(client_ip.clone().unwrap_or_else(|| "unknown".to_string()));
    if let RateLimitDecision::Limited { retry_after } =
        auth_state.rate_limiter().check(RateBucket::Auth, &ip_key, None)
    {
        return Err(AuthFailure::RateLimited { retry_after });
    }

    let password_hash = hash_password(request.password).await?;

    let account_id =
        match insert_account(&pool, &email, &password_hash, Role::default(), unix_now()).await? {
            RegisterOutcome::Created(id) => id,
            RegisterOutcome::Conflict => return Err(AuthFailure::DuplicateEmail),
        };

    info!("account registered: {account_id}");

    establish_session(
        &pool,
        &auth_state,
        account_id,
        &email,
        Role::default(),
        PermissionSet::new(),
        false,
        client_ip.as_deref(),
        extract_user_agent(&headers).as_deref(),
        StatusCode::CREATED,
    )
    .await
}
