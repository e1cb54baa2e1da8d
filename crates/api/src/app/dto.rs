//! Request/response DTOs and their mapping to domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use brokerdesk_auth::{User, UserSnapshot, UserStatus, effective_permissions};
use brokerdesk_core::{RoleId, UserId};
use brokerdesk_infra::{AuthSuccess, RoleRecord};

// ─────────────────────────────────────────────────────────────────────────────
// Auth
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<AuthSuccess> for TokenResponse {
    fn from(success: AuthSuccess) -> Self {
        Self {
            access_token: success.access_token,
            refresh_token: success.refresh_token,
            expires_at: success.access_expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ScopeDto {
    pub scope_type: String,
    pub scope_value: String,
}

/// Profile shape returned by `/auth/me` and admin user reads.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub scopes: Vec<ScopeDto>,
}

impl ProfileResponse {
    pub fn from_snapshot(snapshot: &UserSnapshot) -> Self {
        let permissions = effective_permissions(snapshot)
            .into_iter()
            .map(|p| p.as_str().to_string())
            .collect();
        Self {
            id: snapshot.user.id,
            username: snapshot.user.username.clone(),
            email: snapshot.user.email.clone(),
            full_name: snapshot.user.full_name.clone(),
            roles: snapshot.role_names(),
            permissions,
            scopes: snapshot
                .scopes
                .iter()
                .map(|s| ScopeDto {
                    scope_type: s.scope_type.clone(),
                    scope_value: s.scope_value.clone(),
                })
                .collect(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Admin: users
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub full_name: Option<String>,
    /// Optimistic-concurrency token; a stale value yields 409.
    pub expected_version: u64,
}

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    pub permission: String,
    pub allow: bool,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub active: bool,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            active: user.status == UserStatus::Active,
            version: user.version,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Admin: roles
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateRoleRequest {
    pub name: String,
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub id: RoleId,
    pub name: String,
    pub permissions: Vec<String>,
}

impl From<RoleRecord> for RoleResponse {
    fn from(record: RoleRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            permissions: record
                .permissions
                .into_iter()
                .map(|p| p.as_str().to_string())
                .collect(),
        }
    }
}
