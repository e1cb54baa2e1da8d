use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use brokerdesk_auth::{
    DataScope, Permission, PermissionOverride, RefreshTokenRecord, Role, RoleGrant, User,
    UserSnapshot, UserStatus,
};
use brokerdesk_core::{RoleId, UserId};

use super::r#trait::{
    NewUser, RefreshTokenStore, RoleRecord, RoleStore, StoreError, UserStore, UserUpdate,
};

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<UserId, User>,
    roles: HashMap<RoleId, RoleRecord>,
    /// (user, role) assignments with their timestamps.
    assignments: HashMap<UserId, Vec<(RoleId, DateTime<Utc>)>>,
    /// Keyed by permission code: the store enforces at most one override per
    /// (user, permission) pair.
    overrides: HashMap<UserId, BTreeMap<String, bool>>,
    scopes: HashMap<UserId, Vec<DataScope>>,
    /// Keyed by token hash (the only lookup key for refresh tokens).
    tokens: HashMap<String, RefreshTokenRecord>,
}

/// In-memory store implementing every storage seam.
///
/// Intended for tests and dev mode. A single `RwLock` over all tables gives
/// the same atomicity the Postgres implementation gets from transactions:
/// rotation and the reuse sweep happen entirely under one write lock.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    /// Attach opaque data scopes to a user (test/dev seeding).
    pub fn set_scopes(&self, user_id: UserId, scopes: Vec<DataScope>) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        inner.scopes.insert(user_id, scopes);
        Ok(())
    }

    fn snapshot_of(inner: &Inner, user: &User) -> UserSnapshot {
        let roles = inner
            .assignments
            .get(&user.id)
            .into_iter()
            .flatten()
            .filter_map(|(role_id, assigned_at)| {
                inner.roles.get(role_id).map(|r| RoleGrant {
                    role_id: r.id,
                    role: Role::new(r.name.clone()),
                    permissions: r.permissions.clone(),
                    assigned_at: *assigned_at,
                })
            })
            .collect();

        let overrides = inner
            .overrides
            .get(&user.id)
            .into_iter()
            .flat_map(|m| m.iter())
            .map(|(code, allow)| PermissionOverride {
                permission: Permission::new(code.clone()),
                allow: *allow,
            })
            .collect();

        let scopes = inner.scopes.get(&user.id).cloned().unwrap_or_default();

        UserSnapshot {
            user: user.clone(),
            roles,
            overrides,
            scopes,
        }
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn insert_user(&self, new: NewUser, now: DateTime<Utc>) -> Result<User, StoreError> {
        let mut inner = self.write()?;

        if inner.users.values().any(|u| u.username == new.username) {
            return Err(StoreError::Conflict(format!(
                "username '{}' already exists",
                new.username
            )));
        }

        let user = User {
            id: UserId::new(),
            username: new.username,
            email: new.email,
            full_name: new.full_name,
            password_hash: new.password_hash,
            status: UserStatus::Active,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserSnapshot>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .users
            .values()
            .find(|u| u.username == username)
            .map(|u| Self::snapshot_of(&inner, u)))
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<UserSnapshot>, StoreError> {
        let inner = self.read()?;
        Ok(inner.users.get(&id).map(|u| Self::snapshot_of(&inner, u)))
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let inner = self.read()?;
        let mut users: Vec<User> = inner.users.values().cloned().collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn update_user(
        &self,
        id: UserId,
        update: UserUpdate,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let mut inner = self.write()?;
        let user = inner.users.get_mut(&id).ok_or(StoreError::NotFound)?;

        if user.version != update.expected_version {
            return Err(StoreError::Conflict(format!(
                "stale version: expected {}, found {}",
                update.expected_version, user.version
            )));
        }

        if let Some(email) = update.email {
            user.email = email;
        }
        if let Some(full_name) = update.full_name {
            user.full_name = full_name;
        }
        user.version += 1;
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn set_user_status(
        &self,
        id: UserId,
        status: UserStatus,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let user = inner.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.status = status;
        user.version += 1;
        user.updated_at = now;
        Ok(())
    }

    async fn update_password_hash(
        &self,
        id: UserId,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let user = inner.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.password_hash = password_hash;
        user.updated_at = now;
        Ok(())
    }

    async fn assign_role(
        &self,
        user_id: UserId,
        role_id: RoleId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        if !inner.users.contains_key(&user_id) || !inner.roles.contains_key(&role_id) {
            return Err(StoreError::NotFound);
        }

        let assigned = inner.assignments.entry(user_id).or_default();
        if assigned.iter().any(|(r, _)| *r == role_id) {
            return Err(StoreError::Conflict("role already assigned".to_string()));
        }
        assigned.push((role_id, now));
        Ok(())
    }

    async fn revoke_role(&self, user_id: UserId, role_id: RoleId) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let assigned = inner.assignments.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        let before = assigned.len();
        assigned.retain(|(r, _)| *r != role_id);
        if assigned.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_override(
        &self,
        user_id: UserId,
        permission: Permission,
        allow: bool,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        if !inner.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        inner
            .overrides
            .entry(user_id)
            .or_default()
            .insert(permission.as_str().to_string(), allow);
        Ok(())
    }

    async fn clear_override(
        &self,
        user_id: UserId,
        permission: &Permission,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let overrides = inner.overrides.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        if overrides.remove(permission.as_str()).is_none() {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl RoleStore for InMemoryStore {
    async fn create_role(
        &self,
        name: &str,
        permissions: Vec<Permission>,
    ) -> Result<RoleRecord, StoreError> {
        let mut inner = self.write()?;
        if inner.roles.values().any(|r| r.name == name) {
            return Err(StoreError::Conflict(format!(
                "role '{name}' already exists"
            )));
        }

        let record = RoleRecord {
            id: RoleId::new(),
            name: name.to_string(),
            permissions,
        };
        inner.roles.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_roles(&self) -> Result<Vec<RoleRecord>, StoreError> {
        let inner = self.read()?;
        let mut roles: Vec<RoleRecord> = inner.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<RoleRecord>, StoreError> {
        let inner = self.read()?;
        Ok(inner.roles.values().find(|r| r.name == name).cloned())
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryStore {
    async fn insert_token(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        if inner.tokens.contains_key(&record.token_hash) {
            return Err(StoreError::Conflict("token hash already stored".to_string()));
        }
        inner.tokens.insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn find_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let inner = self.read()?;
        Ok(inner.tokens.get(token_hash).cloned())
    }

    async fn rotate_token(
        &self,
        presented_hash: &str,
        replacement: RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        // Everything under one write lock: the revoke + insert pair is never
        // observable half-applied.
        let mut inner = self.write()?;

        let presented = inner
            .tokens
            .get_mut(presented_hash)
            .ok_or(StoreError::NotFound)?;
        if presented.revoked_at.is_some() {
            return Err(StoreError::Conflict(
                "token already revoked by a concurrent rotation".to_string(),
            ));
        }
        presented.revoked_at = Some(now);
        presented.replaced_by_hash = Some(replacement.token_hash.clone());

        inner.tokens.insert(replacement.token_hash.clone(), replacement);
        Ok(())
    }

    async fn revoke_all_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.write()?;
        let mut revoked = 0;
        for record in inner.tokens.values_mut() {
            if record.user_id == user_id && record.revoked_at.is_none() {
                record.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn active_tokens_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .tokens
            .values()
            .filter(|r| r.user_id == user_id && r.is_active(now))
            .cloned()
            .collect())
    }
}
