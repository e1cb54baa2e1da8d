//! Storage seams for identity and refresh-token state.

mod in_memory;
mod postgres;
mod r#trait;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use r#trait::{
    NewUser, RefreshTokenStore, RoleRecord, RoleStore, StoreError, UserStore, UserUpdate,
};
