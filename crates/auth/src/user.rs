//! Staff user identity and the snapshot types fed to the permission resolver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use brokerdesk_core::{Entity, RoleId, UserId, Versioned};

use crate::{Permission, Role};

// ─────────────────────────────────────────────────────────────────────────────
// User Status
// ─────────────────────────────────────────────────────────────────────────────

/// User account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UserStatus {
    /// User is active and can authenticate.
    #[default]
    Active,
    /// User is deactivated; credentials and refresh tokens are refused.
    Disabled,
}

impl UserStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, UserStatus::Active)
    }
}

impl core::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            UserStatus::Active => write!(f, "Active"),
            UserStatus::Disabled => write!(f, "Disabled"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

/// Staff user identity record.
///
/// # Invariants
/// - `username` is unique per store and compared case-sensitively at login.
/// - `password_hash` is a salted argon2id hash; the plaintext never touches
///   this type.
/// - `version` is the optimistic-concurrency token for administrative updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub status: UserStatus,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Versioned for User {
    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot types
// ─────────────────────────────────────────────────────────────────────────────

/// A role assigned to a user, carried with the permissions it grants.
///
/// The grants are denormalized onto the assignment so that the resolver runs
/// over one loaded snapshot instead of traversing the role/permission graph
/// lazily.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role_id: RoleId,
    pub role: Role,
    pub permissions: Vec<Permission>,
    pub assigned_at: DateTime<Utc>,
}

/// Per-user permission override.
///
/// At most one override exists per (user, permission): `allow = true` grants a
/// permission no role provides; `allow = false` revokes one a role would grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOverride {
    pub permission: Permission,
    pub allow: bool,
}

/// Opaque data-scope pair attached to a user (not interpreted by this core).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataScope {
    pub scope_type: String,
    pub scope_value: String,
}

/// Everything the authentication flows need about one user, loaded in a single
/// consistent read: identity, role grants, overrides, and data scopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSnapshot {
    pub user: User,
    pub roles: Vec<RoleGrant>,
    pub overrides: Vec<PermissionOverride>,
    pub scopes: Vec<DataScope>,
}

impl UserSnapshot {
    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|g| g.role.as_str().to_string()).collect()
    }
}
