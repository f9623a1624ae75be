//! Authenticated principal extraction and authorization guards.
//!
//! Every authenticated request passes the same pipeline, each stage with its
//! own typed rejection:
//!
//! 1. bearer token extraction (header or cookie);
//! 2. cryptographic verification (signature, expiry);
//! 3. session liveness (revocation check, independent of token validity);
//! 4. account state (deactivated, locked);
//! 5. role / permission checks against the resulting principal.

use axum::http::HeaderMap;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    error::AuthFailure,
    roles::{Permission, PermissionSet, Role, has_permission},
    session::extract_request_token,
    state::AuthState,
    storage::lookup_live_session,
    token::TokenError,
    utils::{hash_opaque_token, unix_now},
};

/// Authenticated identity attached to the request context.
///
/// Downstream handlers consult this for ownership checks; the guard itself
/// only decides role and permission questions.
#[derive(Clone, Debug)]
pub struct Principal {
    pub account_id: Uuid,
    pub email: String,
    pub role: Role,
    pub permissions: PermissionSet,
    /// Hash of the session backing this request, for "all but current"
    /// revocation.
    pub session_hash: Vec<u8>,
}

/// Resolve the request credentials into a principal, or reject.
pub(crate) async fn require_auth(
    headers: &HeaderMap,
    pool: &SqlitePool,
    auth_state: &AuthState,
) -> Result<Principal, AuthFailure> {
    let Some(token) = extract_request_token(headers) else {
        return Err(AuthFailure::TokenInvalid);
    };

    // Stage one: the signature proves who issued the token and that it has
    // not aged out. Logs keep the rejection kinds apart; clients see 401.
    let claims = auth_state.tokens().verify(&token).map_err(|err| match err {
        TokenError::Expired => AuthFailure::TokenExpired,
        TokenError::BadSignature | TokenError::Malformed => {
            debug!("bearer token rejected: {err}");
            AuthFailure::TokenInvalid
        }
    })?;

    // Stage two: a cryptographically valid token is still dead if its session
    // record has been revoked or expired.
    let now = unix_now();
    let session_hash = hash_opaque_token(&claims.sid);
    let Some(live) = lookup_live_session(pool, &session_hash, now).await? else {
        return Err(AuthFailure::SessionRevoked);
    };

    if live.account_id.to_string() != claims.sub {
        warn!("session owner does not match token subject");
        return Err(AuthFailure::SessionRevoked);
    }

    // Stage three: account state. A valid token never outranks a lock or a
    // deactivation.
    if !live.account_active {
        return Err(AuthFailure::AccountInactive);
    }
    if let Some(until) = live.locked_until
        && until > now
    {
        return Err(AuthFailure::AccountLocked {
            retry_after: Duration::from_secs(until.saturating_sub(now).unsigned_abs()),
        });
    }

    Ok(Principal {
        account_id: live.account_id,
        email: live.email,
        role: live.role,
        permissions: live.permissions,
        session_hash,
    })
}

/// Coarse-grained check against the role hierarchy.
pub(crate) fn require_role(principal: &Principal, required: Role) -> Result<(), AuthFailure> {
    if principal.role.has_role(required) {
        Ok(())
    } else {
        Err(AuthFailure::InsufficientRole)
    }
}

/// Fine-grained check against the account's permission set.
pub(crate) fn require_permission(
    principal: &Principal,
    permission: Permission,
) -> Result<(), AuthFailure> {
    if has_permission(principal.role, &principal.permissions, permission) {
        Ok(())
    } else {
        Err(AuthFailure::PermissionDenied)
    }
}
