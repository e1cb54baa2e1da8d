//! Administrative role catalog.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};

use brokerdesk_auth::Permission;

use crate::app::dto::{CreateRoleRequest, RoleResponse};
use crate::app::{errors, services::AppServices};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new().route("/", post(create_role).get(list_roles))
}

/// POST /admin/roles
pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(req): Json<CreateRoleRequest>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, "roles.write") {
        return resp;
    }

    let permissions: Vec<Permission> = match req
        .permissions
        .into_iter()
        .map(Permission::parse)
        .collect::<Result<_, _>>()
    {
        Ok(permissions) => permissions,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services.roles.create_role(&req.name, permissions).await {
        Ok(role) => (StatusCode::CREATED, Json(RoleResponse::from(role))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// GET /admin/roles
pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&principal, "roles.read") {
        return resp;
    }

    match services.roles.list_roles().await {
        Ok(roles) => {
            let roles: Vec<RoleResponse> = roles.into_iter().map(RoleResponse::from).collect();
            (StatusCode::OK, Json(roles)).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}
