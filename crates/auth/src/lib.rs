//! `brokerdesk-auth` — pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: credential
//! hashing, effective-permission resolution, token minting/validation, and the
//! access-control gate are all pure functions over loaded snapshots. Orchestration
//! against durable state lives in `brokerdesk-infra`.

pub mod error;
pub mod gate;
pub mod password;
pub mod permissions;
pub mod refresh;
pub mod resolve;
pub mod roles;
pub mod token;
pub mod user;

pub use error::AuthError;
pub use gate::{authorize, GateError, Policy};
pub use password::{PasswordVerifier, VerifyOutcome};
pub use permissions::Permission;
pub use refresh::RefreshTokenRecord;
pub use resolve::effective_permissions;
pub use roles::Role;
pub use token::{AccessClaims, IssuedTokens, TokenConfig, TokenError, TokenIssuer};
pub use user::{DataScope, PermissionOverride, RoleGrant, User, UserSnapshot, UserStatus};
