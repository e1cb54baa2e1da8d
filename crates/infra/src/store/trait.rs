use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use brokerdesk_auth::{Permission, RefreshTokenRecord, User, UserSnapshot, UserStatus};
use brokerdesk_core::{RoleId, UserId};

/// Storage operation error.
///
/// Infrastructure failures (connectivity, serialization) map to `Backend`;
/// `NotFound` and `Conflict` are expected outcomes the caller handles per the
/// domain error taxonomy.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    /// Uniqueness violation or optimistic-concurrency (version) mismatch.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Inputs
// ─────────────────────────────────────────────────────────────────────────────

/// Input for creating a user (administrative command).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: String,
    /// Already-hashed credential; plaintext never reaches the store.
    pub password_hash: String,
}

/// Partial profile update, compared-and-swapped on `expected_version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub expected_version: u64,
}

/// A role with its granted permission codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: RoleId,
    pub name: String,
    pub permissions: Vec<Permission>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// Durable user directory.
///
/// `find_*` methods load the full snapshot (identity + role grants + overrides
/// + scopes) in one consistent read, so permission resolution runs over a
/// single point-in-time view of the graph.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, new: NewUser, now: DateTime<Utc>) -> Result<User, StoreError>;

    /// Lookup by username, case-sensitive per stored value.
    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserSnapshot>, StoreError>;

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<UserSnapshot>, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Update profile fields; `Conflict` when `expected_version` is stale.
    async fn update_user(
        &self,
        id: UserId,
        update: UserUpdate,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError>;

    async fn set_user_status(
        &self,
        id: UserId,
        status: UserStatus,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Replace the stored credential hash (rehash-on-login, password change).
    async fn update_password_hash(
        &self,
        id: UserId,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// `Conflict` when the (user, role) pair already exists.
    async fn assign_role(
        &self,
        user_id: UserId,
        role_id: RoleId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn revoke_role(&self, user_id: UserId, role_id: RoleId) -> Result<(), StoreError>;

    /// Upsert the override for (user, permission); at most one row per pair.
    async fn set_override(
        &self,
        user_id: UserId,
        permission: Permission,
        allow: bool,
    ) -> Result<(), StoreError>;

    async fn clear_override(
        &self,
        user_id: UserId,
        permission: &Permission,
    ) -> Result<(), StoreError>;
}

/// Durable role catalog.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// `Conflict` when the role name already exists.
    async fn create_role(
        &self,
        name: &str,
        permissions: Vec<Permission>,
    ) -> Result<RoleRecord, StoreError>;

    async fn list_roles(&self) -> Result<Vec<RoleRecord>, StoreError>;

    async fn find_role_by_name(&self, name: &str) -> Result<Option<RoleRecord>, StoreError>;
}

/// Durable record of issued refresh tokens, keyed by token hash.
///
/// Records are append + revoke only; nothing is deleted. Rotation and the
/// reuse sweep are the two multi-row writes in this core and both must be
/// atomic (see the crate docs).
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert_token(&self, record: RefreshTokenRecord) -> Result<(), StoreError>;

    async fn find_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Atomic rotation: revoke the presented record (stamping its
    /// `replaced_by_hash` with the replacement's hash) and insert the
    /// replacement, as one write.
    ///
    /// The revocation is a compare-and-set on "not yet revoked": if a
    /// concurrent rotation or sweep got there first, this returns `Conflict`
    /// and writes nothing.
    async fn rotate_token(
        &self,
        presented_hash: &str,
        replacement: RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Reuse-detection sweep: atomically revoke every not-yet-revoked token
    /// for the user. Returns the number of records revoked.
    async fn revoke_all_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Non-revoked, non-expired records for a user (forensics and tests).
    async fn active_tokens_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>, StoreError>;
}
