//! Token issuance: signed access tokens and opaque refresh tokens.
//!
//! Access tokens are HS256 JWTs carrying identity plus one claim entry per
//! effective permission code. Refresh tokens are 512 bits of OS randomness,
//! returned raw exactly once; only their SHA-256 digest is ever stored or
//! logged. Issuance is pure given the config and an injected `now`.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use brokerdesk_core::UserId;

use crate::{Permission, User};

/// Raw refresh-token entropy in bytes (512 bits, hex-encoded on the wire).
const REFRESH_TOKEN_BYTES: usize = 64;

/// Minimum signing-secret length in bytes.
const MIN_SECRET_BYTES: usize = 32;

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

/// Signing and lifetime configuration for issued tokens.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl TokenConfig {
    /// Build a config, rejecting absent or weak signing secrets.
    ///
    /// A missing secret is a fatal configuration error for the service; the
    /// binary surfaces this at startup and refuses to run.
    pub fn new(
        secret: impl Into<String>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<Self, TokenError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }
        if secret.len() < MIN_SECRET_BYTES {
            return Err(TokenError::WeakSecret(MIN_SECRET_BYTES));
        }
        Ok(Self {
            secret,
            issuer: issuer.into(),
            audience: audience.into(),
            access_ttl,
            refresh_ttl,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Claims
// ─────────────────────────────────────────────────────────────────────────────

/// Claims embedded in an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: the user id.
    pub sub: UserId,
    pub username: String,
    pub email: String,
    /// Unique token identifier.
    pub jti: Uuid,
    /// One entry per effective permission code.
    pub permissions: Vec<String>,
    /// Issued-at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

impl AccessClaims {
    /// Exact, case-sensitive membership test against the permission claims.
    pub fn has_permission(&self, code: &str) -> bool {
        self.permissions.iter().any(|p| p == code)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("signing secret is not configured")]
    MissingSecret,

    #[error("signing secret must be at least {0} bytes")]
    WeakSecret(usize),

    #[error("token generation failed: {0}")]
    Generation(String),

    #[error("token has expired")]
    Expired,

    #[error("invalid token")]
    Invalid,
}

// ─────────────────────────────────────────────────────────────────────────────
// Issuer
// ─────────────────────────────────────────────────────────────────────────────

/// Token pair produced by a successful login or rotation.
///
/// `refresh_token` is the raw opaque value; this is the only place it exists
/// in plaintext. Callers persist its hash, never the value.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Mints access/refresh token pairs and validates presented access tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    config: TokenConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenIssuer {
    pub fn new(config: TokenConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Mint a token pair for a user with the given effective permissions.
    ///
    /// Pure given the config: time comes from the caller, randomness is the
    /// only non-determinism. Persisting the refresh-token hash is the caller's
    /// responsibility.
    pub fn issue<'a>(
        &self,
        user: &User,
        permissions: impl IntoIterator<Item = &'a Permission>,
        now: DateTime<Utc>,
    ) -> Result<IssuedTokens, TokenError> {
        let access_expires_at = now + self.config.access_ttl;
        let refresh_expires_at = now + self.config.refresh_ttl;

        let claims = AccessClaims {
            sub: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            jti: Uuid::now_v7(),
            permissions: permissions
                .into_iter()
                .map(|p| p.as_str().to_string())
                .collect(),
            iat: now.timestamp(),
            exp: access_expires_at.timestamp(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };

        let access_token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Generation(e.to_string()))?;

        Ok(IssuedTokens {
            access_token,
            refresh_token: Self::generate_refresh_token(),
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Generate a fresh opaque refresh token (hex-encoded OS randomness).
    pub fn generate_refresh_token() -> String {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Stable one-way digest of a raw refresh token, used only as the storage
    /// lookup key.
    pub fn hash_refresh_token(raw: &str) -> String {
        let digest = Sha256::digest(raw.as_bytes());
        hex::encode(digest)
    }

    /// Validate signature, issuer, audience, and expiry of an access token.
    pub fn decode(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[&self.config.audience]);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss", "aud"]);
        validation.leeway = 0;

        let data =
            decode::<AccessClaims>(token, &self.decoding_key, &validation).map_err(|e| {
                match e.kind() {
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    _ => TokenError::Invalid,
                }
            })?;

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UserStatus;

    fn issuer() -> TokenIssuer {
        let config = TokenConfig::new(
            "unit-test-signing-secret-0123456789ab",
            "brokerdesk",
            "brokerdesk-clients",
            Duration::minutes(30),
            Duration::days(7),
        )
        .unwrap();
        TokenIssuer::new(config)
    }

    fn user() -> User {
        let now = Utc::now();
        User {
            id: UserId::new(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            full_name: "Alice Doe".to_string(),
            password_hash: String::new(),
            status: UserStatus::Active,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn issue_then_decode_round_trips_claims() {
        let issuer = issuer();
        let user = user();
        let perms = [Permission::new("clients.read"), Permission::new("orders.read")];

        let tokens = issuer.issue(&user, perms.iter(), Utc::now()).unwrap();
        let claims = issuer.decode(&tokens.access_token).unwrap();

        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.permissions, vec!["clients.read", "orders.read"]);
        assert!(claims.has_permission("clients.read"));
        assert!(!claims.has_permission("clients.write"));
    }

    #[test]
    fn expired_access_token_is_rejected() {
        let issuer = issuer();
        let past = Utc::now() - Duration::hours(2);

        let tokens = issuer.issue(&user(), std::iter::empty(), past).unwrap();
        assert!(matches!(
            issuer.decode(&tokens.access_token),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn tampered_token_is_invalid() {
        let issuer = issuer();
        let tokens = issuer.issue(&user(), std::iter::empty(), Utc::now()).unwrap();

        let mut tampered = tokens.access_token.clone();
        tampered.push('x');
        assert!(matches!(issuer.decode(&tampered), Err(TokenError::Invalid)));
    }

    #[test]
    fn refresh_tokens_carry_full_entropy_and_are_unique() {
        let a = TokenIssuer::generate_refresh_token();
        let b = TokenIssuer::generate_refresh_token();

        assert_eq!(a.len(), REFRESH_TOKEN_BYTES * 2);
        assert_ne!(a, b);
    }

    #[test]
    fn refresh_hash_is_deterministic_and_one_way() {
        let raw = TokenIssuer::generate_refresh_token();
        let h1 = TokenIssuer::hash_refresh_token(&raw);
        let h2 = TokenIssuer::hash_refresh_token(&raw);

        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, raw);
    }

    #[test]
    fn config_rejects_missing_or_weak_secret() {
        assert!(matches!(
            TokenConfig::new("", "i", "a", Duration::minutes(30), Duration::days(7)),
            Err(TokenError::MissingSecret)
        ));
        assert!(matches!(
            TokenConfig::new("short", "i", "a", Duration::minutes(30), Duration::days(7)),
            Err(TokenError::WeakSecret(_))
        ));
    }
}
