//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures. Storage and
/// transport concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or missing input (including an unaccepted NDA).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Token/email mismatch, unknown token or expired token.
    #[error("unauthorized")]
    Unauthorized,

    /// A staff caller lacks the permission required for the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Unknown request, code, bundle or item.
    #[error("not found: {0}")]
    NotFound(String),

    /// The row already moved on (status transitioned, redemption cap reached).
    ///
    /// Callers must treat this as authoritative and not retry the same transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A time-bound object (e.g. a redemption code) is past its expiry.
    #[error("expired: {0}")]
    Expired(String),

    /// Too many attempts for a key within the current window. Retry later.
    #[error("rate limited: {0}")]
    RateLimited(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn expired(msg: impl Into<String>) -> Self {
        Self::Expired(msg.into())
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Whether a caller may retry the same call later with a different outcome.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}
