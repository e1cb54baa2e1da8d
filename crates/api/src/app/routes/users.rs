//! Administrative user management.
//!
//! Mechanical CRUD over the user directory, guarded by `users.read` /
//! `users.write` permission codes. Profile updates are compare-and-swapped on
//! the caller-supplied `expected_version`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::Utc;
use uuid::Uuid;

use brokerdesk_auth::{Permission, UserStatus};
use brokerdesk_core::UserId;
use brokerdesk_infra::{NewUser, UserUpdate};

use crate::app::dto::{
    AssignRoleRequest, CreateUserRequest, OverrideRequest, ProfileResponse, UpdateUserRequest,
    UserResponse,
};
use crate::app::{errors, services::AppServices};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_user).get(list_users))
        .route("/:id", get(get_user).put(update_user))
        .route("/:id/deactivate", post(deactivate_user))
        .route("/:id/roles", post(assign_role))
        .route("/:id/overrides", put(set_override))
}

/// POST /admin/users
pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(req): Json<CreateUserRequest>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, "users.write") {
        return resp;
    }

    let password_hash = match services.verifier.hash(&req.password) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!(error = %e, "password hashing failed");
            return errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal server error",
            );
        }
    };

    let new = NewUser {
        username: req.username,
        email: req.email,
        full_name: req.full_name,
        password_hash,
    };
    match services.users.insert_user(new, Utc::now()).await {
        Ok(user) => (StatusCode::CREATED, Json(UserResponse::from(user))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// GET /admin/users
pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, "users.read") {
        return resp;
    }

    match services.users.list_users().await {
        Ok(users) => {
            let users: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();
            (StatusCode::OK, Json(users)).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

/// GET /admin/users/:id
pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<Uuid>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, "users.read") {
        return resp;
    }

    match services.users.find_user_by_id(UserId::from_uuid(id)).await {
        Ok(Some(snapshot)) => {
            (StatusCode::OK, Json(ProfileResponse::from_snapshot(&snapshot))).into_response()
        }
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "user not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// PUT /admin/users/:id
pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, "users.write") {
        return resp;
    }

    let update = UserUpdate {
        email: req.email,
        full_name: req.full_name,
        expected_version: req.expected_version,
    };
    match services
        .users
        .update_user(UserId::from_uuid(id), update, Utc::now())
        .await
    {
        Ok(user) => (StatusCode::OK, Json(UserResponse::from(user))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// POST /admin/users/:id/deactivate
pub async fn deactivate_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<Uuid>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, "users.write") {
        return resp;
    }

    match services
        .users
        .set_user_status(UserId::from_uuid(id), UserStatus::Disabled, Utc::now())
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// POST /admin/users/:id/roles — assign a role by name.
pub async fn assign_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignRoleRequest>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, "users.write") {
        return resp;
    }

    let role = match services.roles.find_role_by_name(&req.role).await {
        Ok(Some(role)) => role,
        Ok(None) => {
            return errors::json_error(StatusCode::NOT_FOUND, "not_found", "role not found");
        }
        Err(e) => return errors::store_error_to_response(e),
    };

    match services
        .users
        .assign_role(UserId::from_uuid(id), role.id, Utc::now())
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// PUT /admin/users/:id/overrides — upsert a per-user permission override.
pub async fn set_override(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<OverrideRequest>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, "users.write") {
        return resp;
    }

    let permission = match Permission::parse(req.permission) {
        Ok(permission) => permission,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services
        .users
        .set_override(UserId::from_uuid(id), permission, req.allow)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
