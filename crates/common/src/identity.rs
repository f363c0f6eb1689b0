//! Caller identity supplied by the identity collaborator.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::UserId;

/// Role of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// An exhibitor booking stalls for themselves.
    #[default]
    User,

    /// An organizer with administrative rights.
    Admin,
}

impl Role {
    /// Returns the role name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a role string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Identity of the caller for a single request.
///
/// The reservation engine trusts this value as given; authentication
/// happens before it is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityContext {
    pub user_id: UserId,
    pub role: Role,
}

impl IdentityContext {
    /// Creates an identity with the given user ID and role.
    pub fn new(user_id: impl Into<UserId>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    /// Creates a regular user identity.
    pub fn user(user_id: impl Into<UserId>) -> Self {
        Self::new(user_id, Role::User)
    }

    /// Creates an admin identity.
    pub fn admin(user_id: impl Into<UserId>) -> Self {
        Self::new(user_id, Role::Admin)
    }

    /// Returns true if the caller has administrative rights.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Returns true if the caller may act on a resource owned by `owner`.
    pub fn can_act_for(&self, owner: &UserId) -> bool {
        self.is_admin() || &self.user_id == owner
    }
}
