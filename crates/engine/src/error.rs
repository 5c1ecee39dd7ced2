//! Engine error model.
//!
//! Domain failures pass through unchanged; store failures are split into the
//! ones that mean something to a caller (a duplicate is a `Conflict`) and plain
//! infrastructure errors.

use thiserror::Error;

use trustgate_auth::AuthzError;
use trustgate_core::DomainError;
use trustgate_infra::StoreError;

pub type AccessResult<T> = Result<T, AccessError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("store failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for AccessError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Duplicate(msg) => AccessError::Domain(DomainError::Conflict(msg)),
            other => AccessError::Store(other),
        }
    }
}

impl From<AuthzError> for AccessError {
    fn from(value: AuthzError) -> Self {
        AccessError::Domain(value.into())
    }
}

impl AccessError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            AccessError::Domain(e) => Some(e),
            AccessError::Store(_) => None,
        }
    }

    /// Stable machine-readable code, also used as the HTTP error code.
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::Domain(DomainError::Validation(_)) => "validation",
            AccessError::Domain(DomainError::Unauthorized) => "unauthorized",
            AccessError::Domain(DomainError::Forbidden(_)) => "forbidden",
            AccessError::Domain(DomainError::NotFound(_)) => "not_found",
            AccessError::Domain(DomainError::Conflict(_)) => "conflict",
            AccessError::Domain(DomainError::Expired(_)) => "expired",
            AccessError::Domain(DomainError::RateLimited(_)) => "rate_limited",
            AccessError::Store(_) => "store",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, AccessError::Domain(DomainError::Conflict(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_surface_as_conflicts() {
        let err: AccessError = StoreError::Duplicate("code ABCD".into()).into();
        assert!(err.is_conflict());
        assert_eq!(err.code(), "conflict");
    }

    #[test]
    fn backend_errors_stay_store_errors() {
        let err: AccessError = StoreError::Backend("pool closed".into()).into();
        assert_eq!(err.code(), "store");
        assert!(err.domain().is_none());
    }

    #[test]
    fn authz_maps_to_forbidden() {
        let err: AccessError = AuthzError::Forbidden("requests.review".into()).into();
        assert_eq!(err.code(), "forbidden");
    }
}
