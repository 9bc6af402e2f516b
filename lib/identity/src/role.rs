//! Application roles derived from client-role claims.
//!
//! The identity provider grants client roles per OAuth client. The
//! application collapses them into one coarse role used to pick which
//! screens a user may see. The first configured role name found in the
//! token wins, so a token carrying both the admin and the user role
//! resolves to `Admin`.

use crate::keycloak::KeycloakConfig;
use crate::token::Claims;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse application role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Administrator: approves accounts and manages the directory.
    Admin,
    /// Regular user.
    User,
    /// Field agent (point-of-sale person).
    FieldAgent,
    /// Guest awaiting approval.
    Guest,
    /// Authenticated but holding none of the known client roles.
    Unassigned,
}

impl Role {
    /// Returns true if this role may use the admin directory operations.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Returns a human-readable name for display.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::User => "User",
            Self::FieldAgent => "Field agent (POSP)",
            Self::Guest => "Guest",
            Self::Unassigned => "No role in this client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Ordered mapping from client-role names to application roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePolicy {
    precedence: Vec<(String, Role)>,
}

impl RolePolicy {
    /// Creates a policy checking `admin`, then `user`, then `field_agent`.
    #[must_use]
    pub fn new(
        admin: impl Into<String>,
        user: impl Into<String>,
        field_agent: impl Into<String>,
    ) -> Self {
        Self {
            precedence: vec![
                (admin.into(), Role::Admin),
                (user.into(), Role::User),
                (field_agent.into(), Role::FieldAgent),
            ],
        }
    }

    /// Adds a guest role name, checked after the others.
    #[must_use]
    pub fn with_guest(mut self, guest: impl Into<String>) -> Self {
        self.precedence.push((guest.into(), Role::Guest));
        self
    }

    /// Builds the policy from the configured role names.
    #[must_use]
    pub fn from_config(config: &KeycloakConfig) -> Self {
        let policy = Self::new(
            config.admin_role(),
            config.user_role(),
            config.field_agent_role(),
        );
        match config.guest_role() {
            Some(guest) => policy.with_guest(guest),
            None => policy,
        }
    }

    /// Resolves the role held within `client_id`.
    ///
    /// Total: a missing client entry or an unknown set of roles yields
    /// `Role::Unassigned`.
    #[must_use]
    pub fn resolve_role(&self, claims: &Claims, client_id: &str) -> Role {
        let granted = claims.client_roles(client_id);
        self.precedence
            .iter()
            .find(|(name, _)| granted.iter().any(|g| g == name))
            .map_or(Role::Unassigned, |(_, role)| *role)
    }
}
