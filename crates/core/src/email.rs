//! Normalized email address.
//!
//! Every lookup in the engine (tokens, grants, requests, redemptions) is keyed by
//! email, so normalization happens once, at construction.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_object::ValueObject;

const MAX_EMAIL_LEN: usize = 254;

/// A trimmed, lower-cased email address with a minimal shape check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let normalized = raw.trim().to_lowercase();

        if normalized.is_empty() {
            return Err(DomainError::validation("email is required"));
        }
        if normalized.len() > MAX_EMAIL_LEN {
            return Err(DomainError::validation("email is too long"));
        }
        if normalized.chars().any(char::is_whitespace) {
            return Err(DomainError::validation("email must not contain whitespace"));
        }

        let Some((local, domain)) = normalized.split_once('@') else {
            return Err(DomainError::validation("email must contain '@'"));
        };
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(DomainError::validation("email is malformed"));
        }
        if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
            return Err(DomainError::validation("email domain is malformed"));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Domain part, used for staff notification routing and logs.
    pub fn domain(&self) -> &str {
        self.0.split_once('@').map(|(_, d)| d).unwrap_or_default()
    }
}

impl ValueObject for Email {}

impl core::fmt::Display for Email {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Email {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Email {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        let email = Email::parse("  Alice@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "alice@example.com");
        assert_eq!(email.domain(), "example.com");
    }

    #[test]
    fn rejects_malformed_addresses() {
        for raw in ["", "   ", "alice", "alice@", "@example.com", "a@b@c.com", "a b@c.com", "a@localhost", "a@.com"] {
            assert!(
                matches!(Email::parse(raw), Err(DomainError::Validation(_))),
                "expected validation error for {raw:?}"
            );
        }
    }

    #[test]
    fn deserialize_applies_normalization() {
        let email: Email = serde_json::from_str("\"Bob@Example.org\"").unwrap();
        assert_eq!(email.as_str(), "bob@example.org");
        assert!(serde_json::from_str::<Email>("\"nope\"").is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: any casing of the same address normalizes to one value.
        #[test]
        fn casing_does_not_change_identity(local in "[a-z0-9]{1,12}", domain in "[a-z]{1,10}") {
            let lower = format!("{local}@{domain}.com");
            let upper = lower.to_uppercase();
            prop_assert_eq!(Email::parse(&lower).unwrap(), Email::parse(&upper).unwrap());
        }
    }
}
