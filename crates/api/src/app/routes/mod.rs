use axum::{Router, routing::get};

pub mod auth;
pub mod roles;
pub mod system;
pub mod users;

/// Router for all authenticated endpoints.
pub fn protected_router() -> Router {
    Router::new()
        .route("/auth/me", get(auth::me))
        .nest("/admin/users", users::router())
        .nest("/admin/roles", roles::router())
}
