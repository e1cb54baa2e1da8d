//! Refresh-token rotation with reuse detection.
//!
//! Each raw refresh token is good for exactly one rotation. Presenting a token
//! whose record is no longer active (revoked by an earlier rotation, or past
//! its expiry) is treated as a theft signal: every not-yet-revoked token for
//! that user is revoked in one atomic sweep before the caller gets
//! `TokenReuseDetected`. A legitimate client double-submit pays the same price
//! as an attacker replay; the user re-authenticates.

use std::sync::Arc;

use brokerdesk_auth::{effective_permissions, AuthError, RefreshTokenRecord, TokenIssuer};
use brokerdesk_core::Clock;

use crate::login::{AuthFlowError, AuthSuccess};
use crate::store::{RefreshTokenStore, StoreError, UserStore};

/// Orchestrates refresh-token rotation over injected collaborators.
#[derive(Clone)]
pub struct RefreshOrchestrator {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn RefreshTokenStore>,
    issuer: Arc<TokenIssuer>,
    clock: Arc<dyn Clock>,
}

impl RefreshOrchestrator {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn RefreshTokenStore>,
        issuer: Arc<TokenIssuer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            tokens,
            issuer,
            clock,
        }
    }

    /// Exchange a raw refresh token for a fresh token pair.
    ///
    /// Permissions are resolved from current storage at rotation time, so a
    /// role or override change since login takes effect on the next rotation.
    pub async fn rotate(&self, raw_refresh_token: &str) -> Result<AuthSuccess, AuthFlowError> {
        let presented_hash = TokenIssuer::hash_refresh_token(raw_refresh_token);

        let Some(record) = self.tokens.find_token_by_hash(&presented_hash).await? else {
            return Err(AuthError::InvalidToken.into());
        };

        let now = self.clock.now();
        if !record.is_active(now) {
            return self.sweep_family(&record).await;
        }

        let Some(snapshot) = self.users.find_user_by_id(record.user_id).await? else {
            return Err(AuthError::InvalidToken.into());
        };
        if !snapshot.user.status.is_active() {
            return Err(AuthError::AccountDisabled.into());
        }

        // Mint first, persist second: the rotation write pairs the revocation
        // of the presented record with the insert of its replacement.
        let permissions = effective_permissions(&snapshot);
        let issued = self.issuer.issue(&snapshot.user, permissions.iter(), now)?;

        let replacement = RefreshTokenRecord::new(
            snapshot.user.id,
            TokenIssuer::hash_refresh_token(&issued.refresh_token),
            issued.refresh_expires_at,
            now,
        );

        match self
            .tokens
            .rotate_token(&presented_hash, replacement, now)
            .await
        {
            Ok(()) => {}
            // Lost a race: another rotation revoked this record after our
            // lookup. Same treatment as any reuse.
            Err(StoreError::Conflict(_)) | Err(StoreError::NotFound) => {
                return self.sweep_family(&record).await;
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(user_id = %snapshot.user.id, "refresh token rotated");
        Ok(AuthSuccess {
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
            access_expires_at: issued.access_expires_at,
        })
    }

    /// Revoke every active token for the record's owner, then fail.
    async fn sweep_family(&self, record: &RefreshTokenRecord) -> Result<AuthSuccess, AuthFlowError> {
        let now = self.clock.now();
        let revoked = self.tokens.revoke_all_for_user(record.user_id, now).await?;
        tracing::warn!(
            user_id = %record.user_id,
            revoked,
            "refresh token reuse detected; token family revoked"
        );
        Err(AuthError::TokenReuseDetected.into())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use brokerdesk_auth::{Permission, TokenConfig};
    use brokerdesk_core::{FixedClock, UserId};

    use super::*;
    use crate::login::AuthenticationService;
    use crate::store::{InMemoryStore, NewUser, RoleStore};

    struct Fixture {
        store: Arc<InMemoryStore>,
        login: AuthenticationService,
        rotation: RefreshOrchestrator,
        issuer: Arc<TokenIssuer>,
        clock: Arc<FixedClock>,
    }

    async fn fixture() -> Fixture {
        let config = TokenConfig::new(
            "rotation-flow-test-secret-0123456789",
            "brokerdesk",
            "brokerdesk-clients",
            Duration::minutes(30),
            Duration::days(7),
        )
        .unwrap();
        let issuer = Arc::new(TokenIssuer::new(config));
        // Frozen at real wall-clock time so decoded tokens are not expired
        // under jsonwebtoken's system-clock `exp` validation.
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let store = Arc::new(InMemoryStore::new());
        let login = AuthenticationService::new(
            store.clone(),
            store.clone(),
            issuer.clone(),
            clock.clone(),
        );
        let rotation = RefreshOrchestrator::new(
            store.clone(),
            store.clone(),
            issuer.clone(),
            clock.clone(),
        );
        Fixture {
            store,
            login,
            rotation,
            issuer,
            clock,
        }
    }

    async fn seed_alice(fx: &Fixture) -> UserId {
        let hash = fx.login.verifier().hash("alices-password-xyz").unwrap();
        let user = fx
            .store
            .insert_user(
                NewUser {
                    username: "alice".to_string(),
                    email: "alice@example.com".to_string(),
                    full_name: "Alice Doe".to_string(),
                    password_hash: hash,
                },
                fx.clock.now(),
            )
            .await
            .unwrap();
        let role = fx
            .store
            .create_role("analyst", vec![Permission::new("clients.read")])
            .await
            .unwrap();
        fx.store
            .assign_role(user.id, role.id, fx.clock.now())
            .await
            .unwrap();
        user.id
    }

    #[tokio::test]
    async fn rotation_chains_records_and_reuse_revokes_the_family() {
        let fx = fixture().await;
        let alice = seed_alice(&fx).await;

        let first = fx
            .login
            .login("alice", "alices-password-xyz")
            .await
            .unwrap();
        let h1 = TokenIssuer::hash_refresh_token(&first.refresh_token);

        // R1 -> R2: the old record is revoked and points at its replacement.
        let second = fx.rotation.rotate(&first.refresh_token).await.unwrap();
        let h2 = TokenIssuer::hash_refresh_token(&second.refresh_token);
        assert_ne!(first.refresh_token, second.refresh_token);

        let r1 = fx.store.find_token_by_hash(&h1).await.unwrap().unwrap();
        assert!(r1.is_revoked());
        assert_eq!(r1.replaced_by_hash.as_deref(), Some(h2.as_str()));

        let r2 = fx.store.find_token_by_hash(&h2).await.unwrap().unwrap();
        assert!(r2.is_active(fx.clock.now()));

        // Replaying R1 trips reuse detection and takes R2 down with it.
        assert!(matches!(
            fx.rotation.rotate(&first.refresh_token).await,
            Err(AuthFlowError::Auth(AuthError::TokenReuseDetected))
        ));
        let r2 = fx.store.find_token_by_hash(&h2).await.unwrap().unwrap();
        assert!(r2.is_revoked());
        assert!(fx
            .store
            .active_tokens_for_user(alice, fx.clock.now())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn unknown_token_is_plainly_invalid_and_sweeps_nothing() {
        let fx = fixture().await;
        let alice = seed_alice(&fx).await;
        let active = fx
            .login
            .login("alice", "alices-password-xyz")
            .await
            .unwrap();

        assert!(matches!(
            fx.rotation.rotate("never-issued-token-value").await,
            Err(AuthFlowError::Auth(AuthError::InvalidToken))
        ));

        // The user's real token is untouched.
        let hash = TokenIssuer::hash_refresh_token(&active.refresh_token);
        let record = fx.store.find_token_by_hash(&hash).await.unwrap().unwrap();
        assert!(record.is_active(fx.clock.now()));
        assert_eq!(
            fx.store
                .active_tokens_for_user(alice, fx.clock.now())
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn token_at_exact_expiry_routes_through_the_reuse_sweep() {
        let fx = fixture().await;
        let alice = seed_alice(&fx).await;
        let issued = fx
            .login
            .login("alice", "alices-password-xyz")
            .await
            .unwrap();

        // Jump the clock to exactly the refresh expiry (7-day TTL, inclusive
        // boundary).
        fx.clock.advance(Duration::days(7));

        assert!(matches!(
            fx.rotation.rotate(&issued.refresh_token).await,
            Err(AuthFlowError::Auth(AuthError::TokenReuseDetected))
        ));
        assert!(fx
            .store
            .active_tokens_for_user(alice, fx.clock.now())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn rotation_resolves_permissions_from_current_state() {
        let fx = fixture().await;
        let alice = seed_alice(&fx).await;
        let first = fx
            .login
            .login("alice", "alices-password-xyz")
            .await
            .unwrap();

        // Deny clients.read after login; the rotated access token must not
        // carry it.
        fx.store
            .set_override(alice, Permission::new("clients.read"), false)
            .await
            .unwrap();

        let second = fx.rotation.rotate(&first.refresh_token).await.unwrap();
        let claims = fx.issuer.decode(&second.access_token).unwrap();
        assert!(claims.permissions.is_empty());
    }

    #[tokio::test]
    async fn disabled_owner_cannot_rotate() {
        let fx = fixture().await;
        let alice = seed_alice(&fx).await;
        let issued = fx
            .login
            .login("alice", "alices-password-xyz")
            .await
            .unwrap();

        fx.store
            .set_user_status(alice, brokerdesk_auth::UserStatus::Disabled, fx.clock.now())
            .await
            .unwrap();

        assert!(matches!(
            fx.rotation.rotate(&issued.refresh_token).await,
            Err(AuthFlowError::Auth(AuthError::AccountDisabled))
        ));
    }
}
