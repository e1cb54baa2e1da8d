//! Consistent JSON error responses and flow-error mapping.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use brokerdesk_auth::AuthError;
use brokerdesk_core::DomainError;
use brokerdesk_infra::{AuthFlowError, StoreError};

/// Map a login/rotation failure to its wire representation.
///
/// `InvalidCredentials`, `InvalidToken`, and `TokenReuseDetected` share one
/// generic 401 body: the caller learns nothing about which check failed.
/// `AccountDisabled` is the deliberate exception, disclosed only once the flow
/// has already confirmed the caller's identity.
pub fn auth_flow_error_to_response(err: AuthFlowError) -> axum::response::Response {
    match err {
        AuthFlowError::Auth(AuthError::AccountDisabled) => json_error(
            StatusCode::UNAUTHORIZED,
            "account_disabled",
            "account is disabled",
        ),
        AuthFlowError::Auth(_) => json_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "authentication failed",
        ),
        AuthFlowError::Store(e) => store_error_to_response(e),
        AuthFlowError::Token(e) => {
            tracing::error!(error = %e, "token issuance failed");
            internal_error()
        }
        AuthFlowError::Password(e) => {
            tracing::error!(error = %e, "credential verification failed");
            internal_error()
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::Backend(e) => {
            tracing::error!(error = %e, "storage backend failure");
            internal_error()
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

fn internal_error() -> axum::response::Response {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "internal server error",
    )
}
