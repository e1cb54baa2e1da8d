//! Handler-side authorization guard.
//!
//! Enforcement happens at the route boundary, keeping the flow services and
//! stores auth-agnostic.

use axum::http::StatusCode;
use axum::response::Response;

use brokerdesk_auth::{Policy, authorize};

use crate::app::errors;
use crate::context::PrincipalContext;

/// Require `requirement` for the current principal.
///
/// Code-shaped strings become a claims check against the access token. Any
/// other requirement is satisfied by authentication alone, which the bearer
/// middleware already established by the time a handler runs.
pub fn require(principal: &PrincipalContext, requirement: &str) -> Result<(), Response> {
    match Policy::resolve(requirement) {
        Policy::PermissionCode(code) => authorize(principal.claims(), &code).map_err(|e| {
            tracing::debug!(
                user_id = %principal.user_id(),
                requirement,
                correlation_id = %principal.correlation_id(),
                "authorization denied"
            );
            errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string())
        }),
        Policy::Unrecognized => Ok(()),
    }
}
