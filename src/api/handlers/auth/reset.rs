//! Password reset: opaque request, single-use atomic consumption.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    error::AuthFailure,
    password::hash_password,
    rate_limit::{RateBucket, RateKey, RateLimitDecision},
    state::AuthState,
    storage::{
        ResetOutcome, consume_reset_token, lookup_account_by_email, revoke_all_sessions,
        store_reset_token,
    },
    types::{MessageResponse, ResetConfirmRequest, ResetRequest},
    utils::{
        extract_client_ip, generate_opaque_token, hash_opaque_token, normalize_email, unix_now,
        valid_email, valid_password,
    },
};

const RESET_ACCEPTED_MESSAGE: &str =
    "If an account exists for that address, a reset link is on its way.";

#[utoipa::path(
    post,
    path = "/v1/auth/reset/request",
    request_body = ResetRequest,
    responses(
        (status = 202, description = "Accepted; same response whether or not the account exists", body = MessageResponse),
        (status = 400, description = "Validation error", body = super::error::ErrorBody),
        (status = 429, description = "Rate limited", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn request_reset(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetRequest>>,
) -> Result<Response, AuthFailure> {
    let Some(Json(request)) = payload else {
        return Err(AuthFailure::BadRequest("Missing payload"));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(AuthFailure::BadRequest("Invalid email"));
    }

    // Keyed by the payload email, not only the caller: one address cannot be
    // flooded with reset mail from many IPs.
    let limiter = auth_state.rate_limiter();
    let ip_key = RateKey::Ip(
        extract_client_ip(&headers).unwrap_or_else(|| "unknown".to_string()),
    );
    let email_key = RateKey::Email(email.clone());
    for key in [&ip_key, &email_key] {
        if let RateLimitDecision::Limited { retry_after } =
            limiter.check(RateBucket::PasswordReset, key, None)
        {
            return Err(AuthFailure::RateLimited { retry_after });
        }
    }

    // From here on every path answers 202 with the same body, so responses
    // carry no account-existence signal.
    if let Some(account) = lookup_account_by_email(&pool, &email).await?
        && account.active
    {
        let token = generate_opaque_token()?;
        let token_hash = hash_opaque_token(&token);
        let now = unix_now();
        let expires_at = now + auth_state.config().reset_token_ttl_seconds();
        store_reset_token(&pool, account.id, &token_hash, expires_at, now).await?;

        // The raw token is handed to the mail collaborator, never returned
        // over this API.
        auth_state.mailer().send_reset(&account.email, &token);
        info!("reset token issued for {}", account.id);
    } else {
        debug!("reset requested for unknown or inactive email");
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: RESET_ACCEPTED_MESSAGE.to_string(),
        }),
    )
        .into_response())
}

#[utoipa::path(
    post,
    path = "/v1/auth/reset/confirm",
    request_body = ResetConfirmRequest,
    responses(
        (status = 204, description = "Password reset; all sessions revoked"),
        (status = 400, description = "Invalid or expired token", body = super::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn confirm_reset(
    pool: Extension<SqlitePool>,
    payload: Option<Json<ResetConfirmRequest>>,
) -> Result<Response, AuthFailure> {
    let Some(Json(request)) = payload else {
        return Err(AuthFailure::BadRequest("Missing payload"));
    };

    let token = request.token.trim();
    if token.is_empty() {
        return Err(AuthFailure::BadRequest("Missing token"));
    }
    if !valid_password(&request.new_password) {
        return Err(AuthFailure::BadRequest(
            "Password must be at least 8 characters and contain a letter and a digit",
        ));
    }

    // Hash the replacement first so the consume step stays one atomic
    // statement: lookup, expiry check, password install, and token clearing
    // either all happen or none do.
    let password_hash = hash_password(request.new_password).await?;
    let token_hash = hash_opaque_token(token);

    match consume_reset_token(&pool, &token_hash, &password_hash, unix_now()).await? {
        ResetOutcome::Consumed(account_id) => {
            // A reset proves ownership; anything holding an old session may
            // be the reason the reset was needed.
            let revoked = revoke_all_sessions(&pool, account_id, None).await?;
            info!("password reset for {account_id}; {revoked} session(s) revoked");
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        ResetOutcome::Expired => {
            warn!("expired reset token presented");
            Err(AuthFailure::ResetTokenInvalidOrExpired)
        }
        ResetOutcome::Invalid => {
            warn!("unknown or already-consumed reset token presented");
            Err(AuthFailure::ResetTokenInvalidOrExpired)
        }
    }
}
