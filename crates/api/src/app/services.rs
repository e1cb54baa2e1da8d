//! Service wiring: stores, flow orchestrators, and the token issuer.

use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;

use brokerdesk_auth::{PasswordVerifier, TokenIssuer};
use brokerdesk_core::{Clock, SystemClock};
use brokerdesk_infra::{
    AuthenticationService, InMemoryStore, PostgresStore, RefreshOrchestrator, RefreshTokenStore,
    RoleStore, UserStore,
};

use crate::config::AuthSettings;

/// Everything the handlers need, wired once at startup.
pub struct AppServices {
    pub users: Arc<dyn UserStore>,
    pub roles: Arc<dyn RoleStore>,
    pub tokens: Arc<dyn RefreshTokenStore>,
    pub login: AuthenticationService,
    pub rotation: RefreshOrchestrator,
    pub issuer: Arc<TokenIssuer>,
    pub verifier: PasswordVerifier,
}

/// Wire services over a concrete store implementing all three storage seams.
pub fn build_with_store<S>(store: Arc<S>, issuer: Arc<TokenIssuer>, clock: Arc<dyn Clock>) -> AppServices
where
    S: UserStore + RoleStore + RefreshTokenStore + 'static,
{
    let users: Arc<dyn UserStore> = store.clone();
    let roles: Arc<dyn RoleStore> = store.clone();
    let tokens: Arc<dyn RefreshTokenStore> = store;

    let login = AuthenticationService::new(
        users.clone(),
        tokens.clone(),
        issuer.clone(),
        clock.clone(),
    );
    let rotation = RefreshOrchestrator::new(users.clone(), tokens.clone(), issuer.clone(), clock);

    AppServices {
        users,
        roles,
        tokens,
        login,
        rotation,
        issuer,
        verifier: PasswordVerifier::new(),
    }
}

/// Build services from settings: Postgres when `DATABASE_URL` is set, the
/// in-memory store otherwise.
pub async fn build_services(settings: &AuthSettings) -> anyhow::Result<AppServices> {
    let issuer = Arc::new(TokenIssuer::new(settings.token_config()?));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match &settings.database_url {
        Some(url) => {
            let pool = PgPool::connect(url)
                .await
                .context("failed to connect to DATABASE_URL")?;
            Ok(build_with_store(
                Arc::new(PostgresStore::new(pool)),
                issuer,
                clock,
            ))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; running on in-memory storage (dev mode)");
            Ok(build_with_store(Arc::new(InMemoryStore::new()), issuer, clock))
        }
    }
}
