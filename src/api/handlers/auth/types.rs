//! Request/response types for auth endpoints.

use super::roles::{PermissionSet, Role};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Request the long-lived "remember me" token lifetime.
    #[serde(default)]
    pub remember: Option<bool>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccountResponse {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub permissions: PermissionSet,
}

/// Returned by register and login: the bearer token plus the account it
/// belongs to.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthResponse {
    pub token: String,
    pub account: AccountResponse,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub account_id: String,
    pub email: String,
    pub role: Role,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordChangeRequest {
    /// Accepts the legacy camelCase spelling from older clients.
    #[serde(alias = "currentPassword")]
    pub current_password: String,
    #[serde(alias = "newPassword")]
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetConfirmRequest {
    pub token: String,
    #[serde(alias = "newPassword")]
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccountSummaryResponse {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub active: bool,
    pub failed_attempts: i64,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn login_request_defaults_remember_to_none() -> Result<()> {
        let decoded: LoginRequest =
            serde_json::from_str(r#"{"email":"a@x.com","password":"Aa1!aaaa"}"#)?;
        assert_eq!(decoded.email, "a@x.com");
        assert_eq!(decoded.remember, None);

        let decoded: LoginRequest = serde_json::from_str(
            r#"{"email":"a@x.com","password":"Aa1!aaaa","remember":true}"#,
        )?;
        assert_eq!(decoded.remember, Some(true));
        Ok(())
    }

    #[test]
    fn password_fields_accept_camel_case_aliases() -> Result<()> {
        let decoded: PasswordChangeRequest = serde_json::from_str(
            r#"{"currentPassword":"Aa1!aaaa","newPassword":"Bb2!bbbb"}"#,
        )?;
        assert_eq!(decoded.current_password, "Aa1!aaaa");
        assert_eq!(decoded.new_password, "Bb2!bbbb");

        let decoded: ResetConfirmRequest =
            serde_json::from_str(r#"{"token":"t","newPassword":"Bb2!bbbb"}"#)?;
        assert_eq!(decoded.new_password, "Bb2!bbbb");
        Ok(())
    }

    #[test]
    fn auth_response_round_trips() -> Result<()> {
        let response = AuthResponse {
            token: "jwt".to_string(),
            account: AccountResponse {
                id: "id".to_string(),
                email: "a@x.com".to_string(),
                role: Role::Learner,
                permissions: PermissionSet::new(),
            },
        };
        let value = serde_json::to_value(&response)?;
        let role = value
            .pointer("/account/role")
            .and_then(serde_json::Value::as_str)
            .context("missing role")?;
        assert_eq!(role, "learner");
        let decoded: AuthResponse = serde_json::from_value(value)?;
        assert_eq!(decoded.account.email, "a@x.com");
        Ok(())
    }
}
