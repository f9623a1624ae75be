//! Bearer token issue and verification.
//!
//! Tokens are compact HS256 JWTs carrying identity claims plus `sid`, the
//! opaque session token. Signature and expiry checks here are necessary but
//! not sufficient: callers must still resolve `sid` to a live session record,
//! which is what makes tokens revocable before their natural expiry.

use super::{roles::Role, utils::unix_now};
use anyhow::{Context, Result};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims carried by an Aula bearer token.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Account id
    pub sub: String,
    pub email: String,
    pub role: Role,
    /// Opaque session token; must resolve to a live session record
    pub sid: String,
    pub iat: i64,
    pub exp: i64,
}

/// Why a token was rejected. Callers map all of these to 401; logs keep the
/// distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("bad token signature")]
    BadSignature,
    #[error("malformed token")]
    Malformed,
}

/// Signs and verifies bearer tokens with a server-held secret.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenService {
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        }
    }

    /// Issue a token for an authenticated account.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue(
        &self,
        account_id: Uuid,
        email: &str,
        role: Role,
        session_token: &str,
        ttl_seconds: i64,
    ) -> Result<String> {
        self.issue_at(account_id, email, role, session_token, ttl_seconds, unix_now())
    }

    /// Issue a token with an explicit clock, used by `issue` and by tests
    /// that need control over `iat`/`exp`.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_at(
        &self,
        account_id: Uuid,
        email: &str,
        role: Role,
        session_token: &str,
        ttl_seconds: i64,
        now: i64,
    ) -> Result<String> {
        let claims = Claims {
            sub: account_id.to_string(),
            email: email.to_string(),
            role,
            sid: session_token.to_string(),
            iat: now,
            exp: now + ttl_seconds,
        };

        encode(&Header::default(), &claims, &self.encoding).context("failed to sign bearer token")
    }

    /// Verify signature and expiry, returning the claims.
    ///
    /// # Errors
    /// `Expired`, `BadSignature`, and `Malformed` are distinct so logs can
    /// tell an aged token from a forged one.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is exact; the session record is the source of any grace.
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenError::BadSignature,
                _ => TokenError::Malformed,
            })
    }
}
