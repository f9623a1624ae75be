//! Small helpers for auth validation and opaque token handling.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{RngCore, rngs::OsRng};
use regex::Regex;
use sha2::{Digest, Sha256};

const PASSWORD_MIN_LENGTH: usize = 8;

/// Current unix time in seconds.
#[must_use]
pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Current unix time in milliseconds (rate-limit window resolution).
#[must_use]
pub(crate) fn unix_now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Minimum password policy: length plus at least one letter and one digit.
pub(crate) fn valid_password(password: &str) -> bool {
    password.chars().count() >= PASSWORD_MIN_LENGTH
        && password.chars().any(char::is_alphabetic)
        && password.chars().any(|c| c.is_ascii_digit())
}

/// Create a new opaque token (session id or password reset token).
///
/// The raw value is only handed to the caller; the database stores a hash.
///
/// # Errors
/// Returns an error if the system RNG fails.
pub(crate) fn generate_opaque_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate opaque token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash an opaque token so raw values never touch the database.
/// The hash is used for lookups when the token is presented again.
pub(crate) fn hash_opaque_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Extract a client IP for rate limiting from common proxy headers.
pub(crate) fn extract_client_ip(headers: &axum::http::HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Extract the caller's user agent, if any.
pub(crate) fn extract_user_agent(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn valid_password_requires_length_letter_and_digit() {
        assert!(valid_password("Aa1!aaaa"));
        assert!(valid_password("longenough1"));
        assert!(!valid_password("short1"));
        assert!(!valid_password("nodigitshere"));
        assert!(!valid_password("1234567890"));
    }

    #[test]
    fn generate_opaque_token_round_trip() {
        let decoded_len = generate_opaque_token()
            .ok()
            .and_then(|token| URL_SAFE_NO_PAD.decode(token.as_bytes()).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
    }

    #[test]
    fn hash_opaque_token_stable() {
        let first = hash_opaque_token("token");
        let second = hash_opaque_token("token");
        let different = hash_opaque_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
    }

    #[test]
    fn extract_client_ip_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("1.2.3.4".to_string()));
    }

    #[test]
    fn extract_client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("9.9.9.9".to_string()));
    }

    #[test]
    fn extract_client_ip_none_when_missing() {
        let headers = HeaderMap::new();
        assert_eq!(extract_client_ip(&headers), None);
    }

    #[test]
    fn extract_user_agent_trims_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::USER_AGENT,
            HeaderValue::from_static(" aula-web/1.0 "),
        );
        assert_eq!(extract_user_agent(&headers), Some("aula-web/1.0".to_string()));
    }
}
