use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use brokerdesk_core::{DomainError, DomainResult};

/// Permission identifier.
///
/// Permissions are modeled as opaque, namespaced code strings (e.g.
/// `"clients.read"`, `"accounts.delete"`). The code is the stable business key:
/// globally unique and immutable once referenced by grants. Matching is always
/// exact and case-sensitive; there is no wildcard or hierarchy expansion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(code: impl Into<Cow<'static, str>>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse an externally supplied string, rejecting anything not shaped
    /// like a permission code. Administrative writes go through this; loads
    /// from storage use [`Permission::new`] since stored codes are trusted.
    pub fn parse(code: impl Into<Cow<'static, str>>) -> DomainResult<Self> {
        let code = code.into();
        if !Self::is_code(&code) {
            return Err(DomainError::validation(format!(
                "'{code}' is not a permission code (expected a namespaced string like 'clients.read')"
            )));
        }
        Ok(Self(code))
    }

    /// Whether a string is shaped like a permission code.
    ///
    /// The namespace separator (`.`) is the discriminator: `"clients.read"` is a
    /// code, `"Authenticated"` is not. The access-control gate uses this to
    /// resolve arbitrary code-shaped strings into claim checks without a static
    /// policy enumeration.
    pub fn is_code(s: &str) -> bool {
        s.contains('.')
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Permission {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

impl From<&'static str> for Permission {
    fn from(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_shape_requires_namespace_separator() {
        assert!(Permission::is_code("clients.read"));
        assert!(Permission::is_code("admin.users.write"));
        assert!(!Permission::is_code("Authenticated"));
        assert!(!Permission::is_code(""));
    }

    #[test]
    fn parse_rejects_non_code_strings() {
        assert!(Permission::parse("clients.read").is_ok());
        assert!(Permission::parse("whatever").is_err());
    }
}
