//! Access-control gate: per-request authorization against token claims.
//!
//! Policy resolution is dynamic. Any string shaped like a permission code
//! (it contains the namespace separator) resolves to a claims-membership check,
//! so new permission codes added to the domain need no code-level policy
//! registration. Strings without that shape are left to whatever generic policy
//! handling the host layer provides.

use thiserror::Error;

use crate::{AccessClaims, Permission};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Resolved authorization policy for a requirement string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy {
    /// Requirement is a permission code: allow iff the claims contain it.
    PermissionCode(Permission),
    /// Not shaped like a permission code; this core does not decide it.
    Unrecognized,
}

impl Policy {
    /// Two-tier resolution: code-shaped strings become claim checks, anything
    /// else falls through to the host layer.
    pub fn resolve(requirement: &str) -> Policy {
        if Permission::is_code(requirement) {
            Policy::PermissionCode(Permission::new(requirement.to_string()))
        } else {
            Policy::Unrecognized
        }
    }
}

/// Authorize a caller's claims against a required permission code.
///
/// Allow iff the access token's permission claims contain the code exactly —
/// case-sensitive, no wildcard or hierarchy matching.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(claims: &AccessClaims, required: &Permission) -> Result<(), GateError> {
    if claims.has_permission(required.as_str()) {
        Ok(())
    } else {
        Err(GateError::Forbidden(required.as_str().to_string()))
    }
}
