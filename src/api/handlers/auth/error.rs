//! Categorized auth failures and their HTTP mapping.
//!
//! Every stage of the request pipeline rejects with one of these variants.
//! Store or infrastructure problems surface as `Internal` and deny the
//! request; authorization decisions never fail open.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::time::Duration;
use utoipa::ToSchema;

#[derive(Debug, thiserror::Error)]
pub enum AuthFailure {
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Account is temporarily locked")]
    AccountLocked { retry_after: Duration },
    #[error("Account is deactivated")]
    AccountInactive,
    #[error("Token is malformed or its signature is invalid")]
    TokenInvalid,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Session has been revoked or has expired")]
    SessionRevoked,
    #[error("Insufficient role for this operation")]
    InsufficientRole,
    #[error("Permission denied")]
    PermissionDenied,
    #[error("Too many requests")]
    RateLimited { retry_after: Duration },
    #[error("Reset token is invalid or has expired")]
    ResetTokenInvalidOrExpired,
    #[error("Email is already registered")]
    DuplicateEmail,
    #[error("Internal error")]
    Internal,
}

/// Uniform error envelope returned to clients.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub error_code: String,
}

impl AuthFailure {
    /// Stable machine-readable code for this failure.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthFailure::BadRequest(_) => "invalid_request",
            AuthFailure::InvalidCredentials => "invalid_credentials",
            AuthFailure::AccountLocked { .. } => "account_locked",
            AuthFailure::AccountInactive => "account_inactive",
            AuthFailure::TokenInvalid => "token_invalid",
            AuthFailure::TokenExpired => "token_expired",
            AuthFailure::SessionRevoked => "session_revoked",
            AuthFailure::InsufficientRole => "insufficient_role",
            AuthFailure::PermissionDenied => "permission_denied",
            AuthFailure::RateLimited { .. } => "rate_limited",
            AuthFailure::ResetTokenInvalidOrExpired => "reset_token_invalid_or_expired",
            AuthFailure::DuplicateEmail => "duplicate_email",
            AuthFailure::Internal => "internal_error",
        }
    }

    /// HTTP status for this failure.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthFailure::BadRequest(_) | AuthFailure::ResetTokenInvalidOrExpired => {
                StatusCode::BAD_REQUEST
            }
            AuthFailure::InvalidCredentials
            | AuthFailure::TokenInvalid
            | AuthFailure::TokenExpired
            | AuthFailure::SessionRevoked => StatusCode::UNAUTHORIZED,
            AuthFailure::AccountInactive
            | AuthFailure::InsufficientRole
            | AuthFailure::PermissionDenied => StatusCode::FORBIDDEN,
            AuthFailure::AccountLocked { .. } => StatusCode::LOCKED,
            AuthFailure::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthFailure::DuplicateEmail => StatusCode::CONFLICT,
            AuthFailure::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Seconds the caller should wait before retrying, when that is known.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AuthFailure::AccountLocked { retry_after }
            | AuthFailure::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for AuthFailure {
    fn from(err: anyhow::Error) -> Self {
        // Never leak store or query detail to the client.
        tracing::error!("auth internal error: {err:#}");
        AuthFailure::Internal
    }
}

impl IntoResponse for AuthFailure {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });

        let mut response = (status, body).into_response();
        if let Some(retry_after) = self.retry_after() {
            // Round up so "wait 0 seconds" never appears while still limited.
            let seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            if let Ok(value) = header::HeaderValue::from_str(&seconds.max(1).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
