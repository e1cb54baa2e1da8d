use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use brokerdesk_auth::TokenIssuer;

use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct AuthState {
    pub issuer: Arc<TokenIssuer>,
}

/// Decode the bearer access token and attach a [`PrincipalContext`].
///
/// Every failure (missing header, malformed header, bad signature, expiry,
/// wrong issuer/audience) gets the same bare 401.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer(req.headers())?;

    let claims = state
        .issuer
        .decode(token)
        .map_err(|_e| StatusCode::UNAUTHORIZED)?;

    let correlation_id = brokerdesk_observability::new_correlation_id();
    req.extensions_mut()
        .insert(PrincipalContext::new(claims, correlation_id));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}
