use brokerdesk_auth::AccessClaims;
use brokerdesk_core::UserId;

/// Authenticated principal for a request.
///
/// Built once by the bearer middleware and threaded through handlers as an
/// extension — request-scoped state is always explicit, never a process-wide
/// global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    claims: AccessClaims,
    correlation_id: String,
}

impl PrincipalContext {
    pub fn new(claims: AccessClaims, correlation_id: String) -> Self {
        Self {
            claims,
            correlation_id,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.claims.sub
    }

    pub fn username(&self) -> &str {
        &self.claims.username
    }

    pub fn claims(&self) -> &AccessClaims {
        &self.claims
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}
