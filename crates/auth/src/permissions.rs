use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "requests.review").
/// The wildcard `"*"` grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));
    /// Approve, reject, revoke and resend on both request workflows.
    pub const REVIEW_REQUESTS: Permission = Permission(Cow::Borrowed("requests.review"));
    /// Create and delete per-item grants directly.
    pub const MANAGE_GRANTS: Permission = Permission(Cow::Borrowed("grants.manage"));
    /// Create bundles, create and delete redemption codes.
    pub const MANAGE_BUNDLES: Permission = Permission(Cow::Borrowed("bundles.manage"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
