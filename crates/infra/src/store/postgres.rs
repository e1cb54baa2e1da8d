//! Postgres-backed store implementation.
//!
//! All multi-row writes (token rotation, the reuse sweep) run inside a single
//! transaction, and snapshot loads read within one transaction so the resolver
//! always sees a consistent point-in-time view of the role/override graph.
//!
//! ## Error Mapping
//!
//! | SQLx error | PostgreSQL code | StoreError | Scenario |
//! |------------|-----------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate username, role name, (user, role) pair, or token hash |
//! | RowNotFound | N/A | `NotFound` | Referenced row missing |
//! | Other | Any | `Backend` | Connectivity, pool, decode failures |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;

use brokerdesk_auth::{
    DataScope, Permission, PermissionOverride, RefreshTokenRecord, Role, RoleGrant, User,
    UserSnapshot, UserStatus,
};
use brokerdesk_core::{RefreshTokenId, RoleId, UserId};

use super::r#trait::{
    NewUser, RefreshTokenStore, RoleRecord, RoleStore, StoreError, UserStore, UserUpdate,
};

/// Postgres-backed store for users, roles, overrides, and refresh tokens.
///
/// Thread-safe via the SQLx connection pool. Uniqueness of usernames, role
/// names, (user, role) assignments, (user, permission) overrides, and token
/// hashes is enforced by database constraints, not application checks.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    fn map_err(e: sqlx::Error) -> StoreError {
        match &e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                StoreError::Conflict(db.message().to_string())
            }
            _ => StoreError::Backend(e.to_string()),
        }
    }

    fn status_to_str(status: UserStatus) -> &'static str {
        match status {
            UserStatus::Active => "active",
            UserStatus::Disabled => "disabled",
        }
    }

    fn status_from_str(s: &str) -> UserStatus {
        match s {
            "disabled" => UserStatus::Disabled,
            _ => UserStatus::Active,
        }
    }

    fn user_from_row(row: &sqlx::postgres::PgRow) -> Result<User, StoreError> {
        let status: String = row.try_get("status").map_err(Self::map_err)?;
        let version: i64 = row.try_get("version").map_err(Self::map_err)?;
        Ok(User {
            id: UserId::from_uuid(row.try_get("id").map_err(Self::map_err)?),
            username: row.try_get("username").map_err(Self::map_err)?,
            email: row.try_get("email").map_err(Self::map_err)?,
            full_name: row.try_get("full_name").map_err(Self::map_err)?,
            password_hash: row.try_get("password_hash").map_err(Self::map_err)?,
            status: Self::status_from_str(&status),
            version: version as u64,
            created_at: row.try_get("created_at").map_err(Self::map_err)?,
            updated_at: row.try_get("updated_at").map_err(Self::map_err)?,
        })
    }

    fn token_from_row(row: &sqlx::postgres::PgRow) -> Result<RefreshTokenRecord, StoreError> {
        Ok(RefreshTokenRecord {
            id: RefreshTokenId::from_uuid(row.try_get("id").map_err(Self::map_err)?),
            user_id: UserId::from_uuid(row.try_get("user_id").map_err(Self::map_err)?),
            token_hash: row.try_get("token_hash").map_err(Self::map_err)?,
            expires_at: row.try_get("expires_at").map_err(Self::map_err)?,
            revoked_at: row.try_get("revoked_at").map_err(Self::map_err)?,
            replaced_by_hash: row.try_get("replaced_by_hash").map_err(Self::map_err)?,
            created_at: row.try_get("created_at").map_err(Self::map_err)?,
        })
    }

    /// Load role grants, overrides, and scopes for a user within `tx`.
    async fn load_snapshot_parts(
        tx: &mut Transaction<'_, Postgres>,
        user: User,
    ) -> Result<UserSnapshot, StoreError> {
        let grant_rows = sqlx::query(
            r#"
            SELECT r.id AS role_id, r.name, ur.assigned_at,
                   COALESCE(array_agg(rp.code) FILTER (WHERE rp.code IS NOT NULL), '{}') AS codes
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            LEFT JOIN role_permissions rp ON rp.role_id = r.id
            WHERE ur.user_id = $1
            GROUP BY r.id, r.name, ur.assigned_at
            "#,
        )
        .bind(user.id.as_uuid())
        .fetch_all(&mut **tx)
        .await
        .map_err(Self::map_err)?;

        let mut roles = Vec::with_capacity(grant_rows.len());
        for row in &grant_rows {
            let codes: Vec<String> = row.try_get("codes").map_err(Self::map_err)?;
            let name: String = row.try_get("name").map_err(Self::map_err)?;
            roles.push(RoleGrant {
                role_id: RoleId::from_uuid(row.try_get("role_id").map_err(Self::map_err)?),
                role: Role::new(name),
                permissions: codes.into_iter().map(Permission::from).collect(),
                assigned_at: row.try_get("assigned_at").map_err(Self::map_err)?,
            });
        }

        let override_rows = sqlx::query(
            "SELECT code, allow FROM user_permission_overrides WHERE user_id = $1",
        )
        .bind(user.id.as_uuid())
        .fetch_all(&mut **tx)
        .await
        .map_err(Self::map_err)?;

        let mut overrides = Vec::with_capacity(override_rows.len());
        for row in &override_rows {
            let code: String = row.try_get("code").map_err(Self::map_err)?;
            overrides.push(PermissionOverride {
                permission: Permission::from(code),
                allow: row.try_get("allow").map_err(Self::map_err)?,
            });
        }

        let scope_rows = sqlx::query(
            "SELECT scope_type, scope_value FROM user_data_scopes WHERE user_id = $1",
        )
        .bind(user.id.as_uuid())
        .fetch_all(&mut **tx)
        .await
        .map_err(Self::map_err)?;

        let mut scopes = Vec::with_capacity(scope_rows.len());
        for row in &scope_rows {
            scopes.push(DataScope {
                scope_type: row.try_get("scope_type").map_err(Self::map_err)?,
                scope_value: row.try_get("scope_value").map_err(Self::map_err)?,
            });
        }

        Ok(UserSnapshot {
            user,
            roles,
            overrides,
            scopes,
        })
    }

}

#[async_trait]
impl UserStore for PostgresStore {
    async fn insert_user(&self, new: NewUser, now: DateTime<Utc>) -> Result<User, StoreError> {
        let id = UserId::new();
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, full_name, password_hash, status, version,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'active', 1, $6, $6)
            "#,
        )
        .bind(id.as_uuid())
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.full_name)
        .bind(&new.password_hash)
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(Self::map_err)?;

        Ok(User {
            id,
            username: new.username,
            email: new.email,
            full_name: new.full_name,
            password_hash: new.password_hash,
            status: UserStatus::Active,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserSnapshot>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(Self::map_err)?;

        let row = sqlx::query(
            "SELECT id, username, email, full_name, password_hash, status, version, \
             created_at, updated_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Self::map_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let user = Self::user_from_row(&row)?;
        let snapshot = Self::load_snapshot_parts(&mut tx, user).await?;

        tx.commit().await.map_err(Self::map_err)?;
        Ok(Some(snapshot))
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<UserSnapshot>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(Self::map_err)?;

        let row = sqlx::query(
            "SELECT id, username, email, full_name, password_hash, status, version, \
             created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(Self::map_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let user = Self::user_from_row(&row)?;
        let snapshot = Self::load_snapshot_parts(&mut tx, user).await?;

        tx.commit().await.map_err(Self::map_err)?;
        Ok(Some(snapshot))
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, username, email, full_name, password_hash, status, version, \
             created_at, updated_at FROM users ORDER BY id",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(Self::map_err)?;

        rows.iter().map(Self::user_from_row).collect()
    }

    async fn update_user(
        &self,
        id: UserId,
        update: UserUpdate,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE users
            SET email = COALESCE($3, email),
                full_name = COALESCE($4, full_name),
                version = version + 1,
                updated_at = $5
            WHERE id = $1 AND version = $2
            RETURNING id, username, email, full_name, password_hash, status, version,
                      created_at, updated_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(update.expected_version as i64)
        .bind(update.email)
        .bind(update.full_name)
        .bind(now)
        .fetch_optional(&*self.pool)
        .await
        .map_err(Self::map_err)?;

        match row {
            Some(row) => Self::user_from_row(&row),
            None => {
                // Distinguish a missing row from a stale version.
                let exists = sqlx::query("SELECT 1 FROM users WHERE id = $1")
                    .bind(id.as_uuid())
                    .fetch_optional(&*self.pool)
                    .await
                    .map_err(Self::map_err)?;
                if exists.is_some() {
                    Err(StoreError::Conflict(format!(
                        "stale version: expected {}",
                        update.expected_version
                    )))
                } else {
                    Err(StoreError::NotFound)
                }
            }
        }
    }

    async fn set_user_status(
        &self,
        id: UserId,
        status: UserStatus,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE users SET status = $2, version = version + 1, updated_at = $3 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(Self::status_to_str(status))
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(Self::map_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn update_password_hash(
        &self,
        id: UserId,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1")
                .bind(id.as_uuid())
                .bind(password_hash)
                .bind(now)
                .execute(&*self.pool)
                .await
                .map_err(Self::map_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn assign_role(
        &self,
        user_id: UserId,
        role_id: RoleId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        // FK violations mean the user or role is missing.
        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id, assigned_at) VALUES ($1, $2, $3)",
        )
        .bind(user_id.as_uuid())
        .bind(role_id.as_uuid())
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23503") => {
                StoreError::NotFound
            }
            _ => Self::map_err(e),
        })?;
        Ok(())
    }

    async fn revoke_role(&self, user_id: UserId, role_id: RoleId) -> Result<(), StoreError> {
        let result =
            sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
                .bind(user_id.as_uuid())
                .bind(role_id.as_uuid())
                .execute(&*self.pool)
                .await
                .map_err(Self::map_err)?;

        if result.rows_affected() == 0 {
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
        sqlx::query(
            r#"
            INSERT INTO user_permission_overrides (user_id, code, allow)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, code) DO UPDATE SET allow = EXCLUDED.allow
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(permission.as_str())
        .bind(allow)
        .execute(&*self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23503") => {
                StoreError::NotFound
            }
            _ => Self::map_err(e),
        })?;
        Ok(())
    }

    async fn clear_override(
        &self,
        user_id: UserId,
        permission: &Permission,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "DELETE FROM user_permission_overrides WHERE user_id = $1 AND code = $2",
        )
        .bind(user_id.as_uuid())
        .bind(permission.as_str())
        .execute(&*self.pool)
        .await
        .map_err(Self::map_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl RoleStore for PostgresStore {
    async fn create_role(
        &self,
        name: &str,
        permissions: Vec<Permission>,
    ) -> Result<RoleRecord, StoreError> {
        let id = RoleId::new();
        let mut tx = self.pool.begin().await.map_err(Self::map_err)?;

        sqlx::query("INSERT INTO roles (id, name) VALUES ($1, $2)")
            .bind(id.as_uuid())
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(Self::map_err)?;

        for permission in &permissions {
            sqlx::query("INSERT INTO role_permissions (role_id, code) VALUES ($1, $2)")
                .bind(id.as_uuid())
                .bind(permission.as_str())
                .execute(&mut *tx)
                .await
                .map_err(Self::map_err)?;
        }

        tx.commit().await.map_err(Self::map_err)?;
        Ok(RoleRecord {
            id,
            name: name.to_string(),
            permissions,
        })
    }

    async fn list_roles(&self) -> Result<Vec<RoleRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.name,
                   COALESCE(array_agg(rp.code) FILTER (WHERE rp.code IS NOT NULL), '{}') AS codes
            FROM roles r
            LEFT JOIN role_permissions rp ON rp.role_id = r.id
            GROUP BY r.id, r.name
            ORDER BY r.name
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(Self::map_err)?;

        let mut roles = Vec::with_capacity(rows.len());
        for row in &rows {
            let codes: Vec<String> = row.try_get("codes").map_err(Self::map_err)?;
            roles.push(RoleRecord {
                id: RoleId::from_uuid(row.try_get("id").map_err(Self::map_err)?),
                name: row.try_get("name").map_err(Self::map_err)?,
                permissions: codes.into_iter().map(Permission::from).collect(),
            });
        }
        Ok(roles)
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<RoleRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT r.id, r.name,
                   COALESCE(array_agg(rp.code) FILTER (WHERE rp.code IS NOT NULL), '{}') AS codes
            FROM roles r
            LEFT JOIN role_permissions rp ON rp.role_id = r.id
            WHERE r.name = $1
            GROUP BY r.id, r.name
            "#,
        )
        .bind(name)
        .fetch_optional(&*self.pool)
        .await
        .map_err(Self::map_err)?;

        match row {
            Some(row) => {
                let codes: Vec<String> = row.try_get("codes").map_err(Self::map_err)?;
                Ok(Some(RoleRecord {
                    id: RoleId::from_uuid(row.try_get("id").map_err(Self::map_err)?),
                    name: row.try_get("name").map_err(Self::map_err)?,
                    permissions: codes.into_iter().map(Permission::from).collect(),
                }))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl RefreshTokenStore for PostgresStore {
    async fn insert_token(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, revoked_at,
                                        replaced_by_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.user_id.as_uuid())
        .bind(&record.token_hash)
        .bind(record.expires_at)
        .bind(record.revoked_at)
        .bind(&record.replaced_by_hash)
        .bind(record.created_at)
        .execute(&*self.pool)
        .await
        .map_err(Self::map_err)?;
        Ok(())
    }

    async fn find_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, user_id, token_hash, expires_at, revoked_at, replaced_by_hash, \
             created_at FROM refresh_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&*self.pool)
        .await
        .map_err(Self::map_err)?;

        row.as_ref().map(Self::token_from_row).transpose()
    }

    async fn rotate_token(
        &self,
        presented_hash: &str,
        replacement: RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(Self::map_err)?;

        // CAS on "not yet revoked": a concurrent rotation or sweep that got
        // here first leaves zero rows affected and the whole rotation aborts.
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $2, replaced_by_hash = $3
            WHERE token_hash = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(presented_hash)
        .bind(now)
        .bind(&replacement.token_hash)
        .execute(&mut *tx)
        .await
        .map_err(Self::map_err)?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM refresh_tokens WHERE token_hash = $1")
                .bind(presented_hash)
                .fetch_optional(&mut *tx)
                .await
                .map_err(Self::map_err)?;
            return Err(if exists.is_some() {
                StoreError::Conflict("token already revoked by a concurrent rotation".to_string())
            } else {
                StoreError::NotFound
            });
        }

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, revoked_at,
                                        replaced_by_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(replacement.id.as_uuid())
        .bind(replacement.user_id.as_uuid())
        .bind(&replacement.token_hash)
        .bind(replacement.expires_at)
        .bind(replacement.revoked_at)
        .bind(&replacement.replaced_by_hash)
        .bind(replacement.created_at)
        .execute(&mut *tx)
        .await
        .map_err(Self::map_err)?;

        tx.commit().await.map_err(Self::map_err)?;
        Ok(())
    }

    async fn revoke_all_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        // Single statement: atomic with respect to concurrent rotations.
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id.as_uuid())
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(Self::map_err)?;

        Ok(result.rows_affected())
    }

    async fn active_tokens_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, token_hash, expires_at, revoked_at, replaced_by_hash, \
             created_at FROM refresh_tokens \
             WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > $2",
        )
        .bind(user_id.as_uuid())
        .bind(now)
        .fetch_all(&*self.pool)
        .await
        .map_err(Self::map_err)?;

        rows.iter().map(Self::token_from_row).collect()
    }
}
