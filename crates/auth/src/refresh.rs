//! Refresh-token records and their derived lifecycle state.
//!
//! One row exists per issued refresh token. The raw token value is never
//! stored: only its SHA-256 hash. Records are never deleted by this core;
//! revoked rows are retained for audit and forensics, chained together through
//! `replaced_by_hash`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use brokerdesk_core::{RefreshTokenId, UserId};

/// Durable record of an issued refresh token.
///
/// Stored state is `revoked_at`; `expired` is derived from the clock. A record
/// is *active* iff it is neither revoked nor expired. The expiry boundary is
/// inclusive: a token presented exactly at `expires_at` is already expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub id: RefreshTokenId,
    pub user_id: UserId,
    /// SHA-256 hex digest of the raw token (the lookup key).
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    /// Hash of the token that superseded this one on rotation.
    pub replaced_by_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn new(
        user_id: UserId,
        token_hash: String,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RefreshTokenId::new(),
            user_id,
            token_hash,
            expires_at,
            revoked_at: None,
            replaced_by_hash: None,
            created_at,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired(now)
    }
}
