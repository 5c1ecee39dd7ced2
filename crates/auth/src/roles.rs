use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Staff role name, as supplied by the external identity layer.
///
/// Roles are opaque strings; `crate::authorize` maps them to permissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    /// Full access to every staff operation.
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    /// Reviews portal and trust-center requests, manages grants.
    pub const REVIEWER: Role = Role(Cow::Borrowed("reviewer"));
    /// Manages bundles and redemption codes.
    pub const CATALOG_MANAGER: Role = Role(Cow::Borrowed("catalog_manager"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
