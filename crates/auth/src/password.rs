//! Credential verification: salted, versioned, deliberately slow hashing.
//!
//! Uses argon2id via the `argon2` crate. Hashes are stored in PHC string format,
//! which embeds the algorithm, version, parameters, and salt, so parameter
//! upgrades are detected at verification time and surfaced as a rehash signal.

use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier as _, SaltString, rand_core::OsRng,
    },
};
use thiserror::Error;

/// Outcome of verifying a password against a stored hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Password matches the stored hash.
    Match,
    /// Password matches, but the hash was produced with outdated parameters
    /// and should be recomputed on this login.
    MatchNeedsRehash,
    /// Password does not match. Callers must treat this identically to
    /// "user not found" for login purposes.
    Mismatch,
}

impl VerifyOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, VerifyOutcome::Match | VerifyOutcome::MatchNeedsRehash)
    }
}

#[derive(Debug, Error)]
pub enum PasswordError {
    /// The stored hash string is not a valid PHC string.
    #[error("malformed stored password hash")]
    MalformedHash,

    /// Hashing itself failed (parameter or RNG problem).
    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Pure verifier over (stored hash, candidate password) pairs. No side effects.
#[derive(Debug, Default, Clone)]
pub struct PasswordVerifier {
    argon2: Argon2<'static>,
}

impl PasswordVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash a plaintext password with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PasswordError::Hash(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// Verify a plaintext password against a stored PHC-format hash.
    pub fn verify(&self, stored_hash: &str, password: &str) -> Result<VerifyOutcome, PasswordError> {
        let parsed = PasswordHash::new(stored_hash).map_err(|_| PasswordError::MalformedHash)?;

        if self
            .argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_err()
        {
            return Ok(VerifyOutcome::Mismatch);
        }

        // A match under an older algorithm identifier or version means the hash
        // predates the current parameters and should be recomputed.
        let outdated = parsed.algorithm != argon2::ARGON2ID_IDENT
            || parsed.version != Some(argon2::Version::default() as u32);

        if outdated {
            Ok(VerifyOutcome::MatchNeedsRehash)
        } else {
            Ok(VerifyOutcome::Match)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_verifies() {
        let verifier = PasswordVerifier::new();
        let hash = verifier.hash("s3cret-hunter2").unwrap();

        let outcome = verifier.verify(&hash, "s3cret-hunter2").unwrap();
        assert_eq!(outcome, VerifyOutcome::Match);
    }

    #[test]
    fn wrong_password_is_mismatch() {
        let verifier = PasswordVerifier::new();
        let hash = verifier.hash("correct horse").unwrap();

        let outcome = verifier.verify(&hash, "battery staple").unwrap();
        assert_eq!(outcome, VerifyOutcome::Mismatch);
    }

    #[test]
    fn salts_are_unique_per_hash() {
        let verifier = PasswordVerifier::new();
        let a = verifier.hash("same-password").unwrap();
        let b = verifier.hash("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_stored_hash_is_an_error() {
        let verifier = PasswordVerifier::new();
        assert!(matches!(
            verifier.verify("not-a-phc-string", "whatever"),
            Err(PasswordError::MalformedHash)
        ));
    }
}
