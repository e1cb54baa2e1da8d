//! Login orchestration: credentials in, token pair out.
//!
//! Sequencing matters here. The password is always verified before the account
//! status is consulted, so a caller holding valid credentials for a disabled
//! account learns the account is disabled, while a caller without them learns
//! nothing beyond "invalid credentials" — the same answer an unknown username
//! gets.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use brokerdesk_auth::password::PasswordError;
use brokerdesk_auth::{
    effective_permissions, AuthError, IssuedTokens, PasswordVerifier, RefreshTokenRecord,
    TokenError, TokenIssuer, UserSnapshot, VerifyOutcome,
};
use brokerdesk_core::Clock;

use crate::store::{RefreshTokenStore, StoreError, UserStore};

/// Outcome of a successful login or refresh rotation.
///
/// `refresh_token` is the raw opaque value, surfaced to the client exactly
/// once; only its hash is persisted.
#[derive(Debug, Clone)]
pub struct AuthSuccess {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
}

/// Failure modes of the login and rotation flows.
///
/// `Auth` variants carry the caller-visible taxonomy; the rest are internal
/// faults the transport layer maps to a generic 500.
#[derive(Debug, Error)]
pub enum AuthFlowError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Password(#[from] PasswordError),
}

/// Orchestrates the credential login flow over injected collaborators.
#[derive(Clone)]
pub struct AuthenticationService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn RefreshTokenStore>,
    issuer: Arc<TokenIssuer>,
    verifier: PasswordVerifier,
    clock: Arc<dyn Clock>,
}

impl AuthenticationService {
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
            verifier: PasswordVerifier::new(),
            clock,
        }
    }

    pub fn verifier(&self) -> &PasswordVerifier {
        &self.verifier
    }

    /// Authenticate a username/password pair and mint a token pair.
    ///
    /// An unknown username and a wrong password both yield
    /// `AuthError::InvalidCredentials` with nothing to distinguish them.
    /// `AccountDisabled` is only reachable after the password verified.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthSuccess, AuthFlowError> {
        let Some(snapshot) = self.users.find_user_by_username(username).await? else {
            return Err(AuthError::InvalidCredentials.into());
        };

        let outcome = self
            .verifier
            .verify(&snapshot.user.password_hash, password)?;
        if outcome == VerifyOutcome::Mismatch {
            return Err(AuthError::InvalidCredentials.into());
        }

        let now = self.clock.now();

        if outcome == VerifyOutcome::MatchNeedsRehash {
            self.rehash_credential(&snapshot, password, now).await;
        }

        if !snapshot.user.status.is_active() {
            return Err(AuthError::AccountDisabled.into());
        }

        let issued = self.issue_and_store(&snapshot, now).await?;
        tracing::info!(user_id = %snapshot.user.id, username, "login succeeded");

        Ok(AuthSuccess {
            access_token: issued.access_token,
            refresh_token: issued.refresh_token,
            access_expires_at: issued.access_expires_at,
        })
    }

    /// Mint a token pair for the snapshot and persist the refresh-token hash.
    async fn issue_and_store(
        &self,
        snapshot: &UserSnapshot,
        now: DateTime<Utc>,
    ) -> Result<IssuedTokens, AuthFlowError> {
        let permissions = effective_permissions(snapshot);
        let issued = self.issuer.issue(&snapshot.user, permissions.iter(), now)?;

        let record = RefreshTokenRecord::new(
            snapshot.user.id,
            TokenIssuer::hash_refresh_token(&issued.refresh_token),
            issued.refresh_expires_at,
            now,
        );
        self.tokens.insert_token(record).await?;
        Ok(issued)
    }

    /// Upgrade an outdated credential hash in place. Best effort: the login
    /// already succeeded, so a failure here is logged and swallowed.
    async fn rehash_credential(&self, snapshot: &UserSnapshot, password: &str, now: DateTime<Utc>) {
        let rehashed = match self.verifier.hash(password) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(user_id = %snapshot.user.id, error = %e, "credential rehash failed");
                return;
            }
        };
        if let Err(e) = self
            .users
            .update_password_hash(snapshot.user.id, rehashed, now)
            .await
        {
            tracing::warn!(user_id = %snapshot.user.id, error = %e, "credential rehash write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use brokerdesk_auth::{Permission, TokenConfig, UserStatus};
    use brokerdesk_core::{FixedClock, UserId};

    use super::*;
    use crate::store::{InMemoryStore, NewUser, RoleStore};

    fn issuer() -> Arc<TokenIssuer> {
        let config = TokenConfig::new(
            "login-flow-test-secret-0123456789abcd",
            "brokerdesk",
            "brokerdesk-clients",
            Duration::minutes(30),
            Duration::days(7),
        )
        .unwrap();
        Arc::new(TokenIssuer::new(config))
    }

    // Frozen at real wall-clock time: token decoding validates `exp` against
    // the system clock, so frozen-past timestamps would read as expired.
    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(Utc::now()))
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        service: AuthenticationService,
        issuer: Arc<TokenIssuer>,
        clock: Arc<FixedClock>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let issuer = issuer();
        let clock = clock();
        let service = AuthenticationService::new(
            store.clone(),
            store.clone(),
            issuer.clone(),
            clock.clone(),
        );
        Fixture {
            store,
            service,
            issuer,
            clock,
        }
    }

    async fn seed_user(fx: &Fixture, username: &str, password: &str) -> UserId {
        let hash = fx.service.verifier().hash(password).unwrap();
        let user = fx
            .store
            .insert_user(
                NewUser {
                    username: username.to_string(),
                    email: format!("{username}@example.com"),
                    full_name: username.to_string(),
                    password_hash: hash,
                },
                fx.clock.now(),
            )
            .await
            .unwrap();
        user.id
    }

    async fn grant_role(fx: &Fixture, user_id: UserId, name: &str, codes: &[&str]) {
        let role = fx
            .store
            .create_role(name, codes.iter().map(|c| Permission::new(c.to_string())).collect())
            .await
            .unwrap();
        fx.store
            .assign_role(user_id, role.id, fx.clock.now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn login_issues_tokens_with_effective_permission_claims() {
        let fx = fixture().await;
        let alice = seed_user(&fx, "alice", "hunter2-but-long").await;
        grant_role(&fx, alice, "analyst", &["clients.read", "orders.read"]).await;

        let success = fx.service.login("alice", "hunter2-but-long").await.unwrap();

        let claims = fx.issuer.decode(&success.access_token).unwrap();
        assert_eq!(claims.sub, alice);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.permissions, vec!["clients.read", "orders.read"]);
        assert_eq!(
            success.access_expires_at,
            fx.clock.now() + Duration::minutes(30)
        );

        // The refresh token is persisted as a hash, never raw.
        let hash = TokenIssuer::hash_refresh_token(&success.refresh_token);
        let record = fx.store.find_token_by_hash(&hash).await.unwrap().unwrap();
        assert_eq!(record.user_id, alice);
        assert!(record.is_active(fx.clock.now()));
        assert!(fx
            .store
            .find_token_by_hash(&success.refresh_token)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn deny_override_is_absent_from_claims() {
        let fx = fixture().await;
        let bob = seed_user(&fx, "bob", "correct-horse-battery").await;
        grant_role(&fx, bob, "viewer", &["clients.read", "reports.read"]).await;
        fx.store
            .set_override(bob, Permission::new("reports.read"), false)
            .await
            .unwrap();

        let success = fx
            .service
            .login("bob", "correct-horse-battery")
            .await
            .unwrap();

        let claims = fx.issuer.decode(&success.access_token).unwrap();
        assert_eq!(claims.permissions, vec!["clients.read"]);
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_password_are_indistinguishable() {
        let fx = fixture().await;
        seed_user(&fx, "carol", "a-real-password-123").await;

        let unknown = fx.service.login("nobody", "whatever-here").await;
        let wrong = fx.service.login("carol", "not-the-password").await;

        let unknown_msg = match unknown {
            Err(AuthFlowError::Auth(e @ AuthError::InvalidCredentials)) => e.to_string(),
            other => panic!("expected invalid credentials, got {other:?}"),
        };
        let wrong_msg = match wrong {
            Err(AuthFlowError::Auth(e @ AuthError::InvalidCredentials)) => e.to_string(),
            other => panic!("expected invalid credentials, got {other:?}"),
        };
        assert_eq!(unknown_msg, wrong_msg);
    }

    #[tokio::test]
    async fn disabled_account_is_reported_only_with_valid_credentials() {
        let fx = fixture().await;
        let dave = seed_user(&fx, "dave", "daves-password-xyz").await;
        fx.store
            .set_user_status(dave, UserStatus::Disabled, fx.clock.now())
            .await
            .unwrap();

        // Right password: the disabled status is disclosed.
        assert!(matches!(
            fx.service.login("dave", "daves-password-xyz").await,
            Err(AuthFlowError::Auth(AuthError::AccountDisabled))
        ));
        // Wrong password: same answer as any bad credential.
        assert!(matches!(
            fx.service.login("dave", "wrong-password-xyz").await,
            Err(AuthFlowError::Auth(AuthError::InvalidCredentials))
        ));
        // No tokens were minted along the way.
        assert!(fx
            .store
            .active_tokens_for_user(dave, fx.clock.now())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn login_with_no_roles_yields_empty_permission_claims() {
        let fx = fixture().await;
        seed_user(&fx, "erin", "erins-password-abc").await;

        let success = fx.service.login("erin", "erins-password-abc").await.unwrap();
        let claims = fx.issuer.decode(&success.access_token).unwrap();
        assert!(claims.permissions.is_empty());
    }
}
