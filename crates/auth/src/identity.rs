use serde::{Deserialize, Serialize};

use trustgate_core::{DomainError, Email};

/// The caller of a portal or trust-center operation.
///
/// Passed explicitly into every call; the engine keeps no session state.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: Email,
    pub token: String,
}

impl Identity {
    pub fn new(email: &str, token: impl Into<String>) -> Result<Self, DomainError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(DomainError::Unauthorized);
        }
        Ok(Self {
            email: Email::parse(email)?,
            token: token.trim().to_string(),
        })
    }
}

impl core::fmt::Debug for Identity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Identity")
            .field("email", &self.email)
            .field("token", &"<redacted>")
            .finish()
    }
}
