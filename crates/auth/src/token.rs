//! Opaque bearer tokens.
//!
//! A token carries no claims: it is a random string whose meaning lives
//! entirely in the store row it maps to. Revocation therefore never needs a
//! blacklist; deleting or invalidating the backing state is enough.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use trustgate_core::{CodeId, Email, GatedRequestId, RequestId};

/// Random bytes per token (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// What produced a token.
///
/// For request origins, token validity is re-derived from the request's live
/// status on every verification. Redemption tokens depend only on their own
/// expiry; what they unlock is bounded by the holder's grants.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "flow", content = "request_id", rename_all = "snake_case")]
pub enum TokenOrigin {
    /// Resources Portal (simple) request.
    Portal(RequestId),
    /// Trust Center (NDA-gated) request.
    TrustCenter(GatedRequestId),
    /// Redemption of a bundle code.
    Redemption(CodeId),
}

/// Stored bearer credential bound to one email.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub email: Email,
    pub origin: TokenOrigin,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// Tokens are credentials; keep them out of logs.
impl core::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("email", &self.email)
            .field("origin", &self.origin)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessToken {
    pub fn issue(
        email: Email,
        origin: TokenOrigin,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            token: generate_token(),
            email,
            origin,
            issued_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

/// Outcome of `verifyToken`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenVerification {
    pub valid: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenVerification {
    pub fn valid(expires_at: DateTime<Utc>) -> Self {
        Self {
            valid: true,
            expires_at: Some(expires_at),
        }
    }

    pub fn invalid() -> Self {
        Self {
            valid: false,
            expires_at: None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token is bound to a different email")]
    EmailMismatch,

    #[error("token has expired")]
    Expired,
}

/// Check the token row itself (binding + expiry).
///
/// The originating request's status is checked separately by the caller, which
/// has store access.
pub fn check_token(
    token: &AccessToken,
    email: &Email,
    now: DateTime<Utc>,
) -> Result<(), TokenValidationError> {
    if &token.email != email {
        return Err(TokenValidationError::EmailMismatch);
    }
    if now >= token.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

/// Generate a fresh 256-bit token, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
