//! Role hierarchy and fine-grained permissions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use utoipa::ToSchema;

/// Account roles, ordered by privilege.
///
/// The derived order is the authorization hierarchy:
/// `Guest < Learner < Instructor < Admin`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Unregistered or pre-verification visitor
    Guest,
    /// Normal registered user (consumes courses)
    Learner,
    /// Creates and maintains course content
    Instructor,
    /// Full administrative access
    Admin,
}

impl Role {
    /// Check if this role has at least the privileges of the required role.
    #[must_use]
    pub fn has_role(self, required: Role) -> bool {
        self >= required
    }

    /// Parse a role from its storage form (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Role> {
        match s.to_lowercase().as_str() {
            "guest" => Some(Role::Guest),
            "learner" => Some(Role::Learner),
            "instructor" => Some(Role::Instructor),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::Learner => "learner",
            Role::Instructor => "instructor",
            Role::Admin => "admin",
        }
    }
}

impl Default for Role {
    /// Default role is Learner (what registration grants).
    fn default() -> Self {
        Role::Learner
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fine-grained permissions that can be attached to an account.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManageCourses,
    PublishLessons,
    ViewAnalytics,
    ModerateContent,
    ManageAccounts,
}

/// The permission set attached to an account.
///
/// Stored as a JSON string array; converted to and from that form only at the
/// storage boundary. Absence of a permission means deny.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, permission: Permission) {
        self.0.insert(permission);
    }

    #[must_use]
    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialize for the `permissions` column.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialize from the `permissions` column.
    ///
    /// # Errors
    /// Returns an error when the stored value is not a valid permission array.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Evaluate a fine-grained permission check for an account.
///
/// Admin short-circuits to allow; everyone else needs an explicit grant.
#[must_use]
pub fn has_permission(role: Role, permissions: &PermissionSet, permission: Permission) -> bool {
    if role == Role::Admin {
        return true;
    }
    permissions.contains(permission)
}
