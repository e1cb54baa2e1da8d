//! Authentication error taxonomy.

use thiserror::Error;

/// Expected, caller-recoverable authentication failures.
///
/// These are typed values, never generic faults, and are not retried by this
/// core. The messages are part of the wire contract: `InvalidCredentials`
/// deliberately carries no detail so "unknown user" and "wrong password" are
/// externally indistinguishable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown username, or correct username with wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Identity was otherwise confirmed, but the account is deactivated.
    /// Disclosed distinctly once past credential/token verification.
    #[error("account is disabled")]
    AccountDisabled,

    /// Presented refresh token matches no stored hash.
    #[error("invalid token")]
    InvalidToken,

    /// Presented refresh token matches a record that is already revoked or
    /// expired. The whole token family has been revoked as a side effect;
    /// callers should force a full re-login.
    #[error("token reuse detected")]
    TokenReuseDetected,
}
