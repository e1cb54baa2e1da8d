//! `brokerdesk-infra` — storage collaborators and storage-coupled orchestration.
//!
//! The pure auth crate computes; this crate persists and sequences. Storage is
//! behind async traits with an in-memory implementation (tests/dev) and a
//! Postgres implementation (production), mirroring each other's atomicity
//! guarantees: rotation and the reuse sweep are single atomic writes.

pub mod login;
pub mod rotation;
pub mod store;

pub use login::{AuthFlowError, AuthSuccess, AuthenticationService};
pub use rotation::RefreshOrchestrator;
pub use store::{
    InMemoryStore, NewUser, PostgresStore, RefreshTokenStore, RoleRecord, RoleStore, StoreError,
    UserStore, UserUpdate,
};
