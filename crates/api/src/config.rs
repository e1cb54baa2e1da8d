//! Environment-driven service settings.

use anyhow::Context;
use chrono::Duration;

use brokerdesk_auth::{TokenConfig, TokenError};

const DEFAULT_ISSUER: &str = "brokerdesk";
const DEFAULT_AUDIENCE: &str = "brokerdesk-clients";
const DEFAULT_ACCESS_TTL_MINUTES: i64 = 30;
const DEFAULT_REFRESH_TTL_DAYS: i64 = 7;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Settings for the API binary, read once at startup.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Absent means dev mode on the in-memory store.
    pub database_url: Option<String>,
    pub bind_addr: String,
}

impl AuthSettings {
    /// Read settings from process environment variables.
    ///
    /// A missing `JWT_SECRET` is fatal: the service refuses to start rather
    /// than fall back to a guessable signing key.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = get("JWT_SECRET")
            .context("JWT_SECRET is not set; refusing to start without a signing secret")?;

        let access_minutes = match get("ACCESS_TOKEN_TTL_MINUTES") {
            Some(raw) => raw
                .parse::<i64>()
                .context("ACCESS_TOKEN_TTL_MINUTES must be an integer")?,
            None => DEFAULT_ACCESS_TTL_MINUTES,
        };
        let refresh_days = match get("REFRESH_TOKEN_TTL_DAYS") {
            Some(raw) => raw
                .parse::<i64>()
                .context("REFRESH_TOKEN_TTL_DAYS must be an integer")?,
            None => DEFAULT_REFRESH_TTL_DAYS,
        };

        Ok(Self {
            jwt_secret,
            issuer: get("JWT_ISSUER").unwrap_or_else(|| DEFAULT_ISSUER.to_string()),
            audience: get("JWT_AUDIENCE").unwrap_or_else(|| DEFAULT_AUDIENCE.to_string()),
            access_ttl: Duration::minutes(access_minutes),
            refresh_ttl: Duration::days(refresh_days),
            database_url: get("DATABASE_URL"),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        })
    }

    pub fn token_config(&self) -> Result<TokenConfig, TokenError> {
        TokenConfig::new(
            self.jwt_secret.clone(),
            self.issuer.clone(),
            self.audience.clone(),
            self.access_ttl,
            self.refresh_ttl,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        move |name| map.get(name).map(|v| v.to_string())
    }

    #[test]
    fn missing_secret_is_fatal() {
        let result = AuthSettings::from_lookup(lookup(&[]));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let settings = AuthSettings::from_lookup(lookup(&[(
            "JWT_SECRET",
            "a-sufficiently-long-signing-secret-value",
        )]))
        .unwrap();

        assert_eq!(settings.issuer, "brokerdesk");
        assert_eq!(settings.audience, "brokerdesk-clients");
        assert_eq!(settings.access_ttl, Duration::minutes(30));
        assert_eq!(settings.refresh_ttl, Duration::days(7));
        assert_eq!(settings.bind_addr, "0.0.0.0:8080");
        assert!(settings.database_url.is_none());
        assert!(settings.token_config().is_ok());
    }

    #[test]
    fn explicit_ttls_override_defaults() {
        let settings = AuthSettings::from_lookup(lookup(&[
            ("JWT_SECRET", "a-sufficiently-long-signing-secret-value"),
            ("ACCESS_TOKEN_TTL_MINUTES", "5"),
            ("REFRESH_TOKEN_TTL_DAYS", "1"),
        ]))
        .unwrap();

        assert_eq!(settings.access_ttl, Duration::minutes(5));
        assert_eq!(settings.refresh_ttl, Duration::days(1));
    }
}
