//! Login, refresh rotation, and the caller's own profile.

use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use crate::app::dto::{LoginRequest, ProfileResponse, RefreshRequest, TokenResponse};
use crate::app::{errors, services::AppServices};
use crate::context::PrincipalContext;

/// POST /auth/login
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<LoginRequest>,
) -> axum::response::Response {
    match services.login.login(&req.username, &req.password).await {
        Ok(success) => (StatusCode::OK, Json(TokenResponse::from(success))).into_response(),
        Err(e) => errors::auth_flow_error_to_response(e),
    }
}

/// POST /auth/refresh
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<RefreshRequest>,
) -> axum::response::Response {
    match services.rotation.rotate(&req.refresh_token).await {
        Ok(success) => (StatusCode::OK, Json(TokenResponse::from(success))).into_response(),
        Err(e) => errors::auth_flow_error_to_response(e),
    }
}

/// GET /auth/me — the authenticated caller's profile, with roles, effective
/// permissions, and data scopes resolved from current storage.
pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.users.find_user_by_id(principal.user_id()).await {
        Ok(Some(snapshot)) => {
            (StatusCode::OK, Json(ProfileResponse::from_snapshot(&snapshot))).into_response()
        }
        // Token outlived the account row.
        Ok(None) => errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", "authentication failed"),
        Err(e) => errors::store_error_to_response(e),
    }
}
