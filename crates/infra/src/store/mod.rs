//! Grant store boundary.
//!
//! Reads are unlocked snapshots straight off the store. Anything that must be
//! all-or-nothing goes through a [`UnitOfWork`] obtained from
//! [`AccessStore::begin`]: status transitions, grant writes, token issuance and
//! redemption accounting.
//!
//! ## Conditional writes
//!
//! Status changes and the redemption counter are compare-and-set operations that
//! report how many rows they touched ([`Affected`]). Callers check the count and
//! turn zero into a `Conflict`; they never read-then-write.
//!
//! ## Rollback
//!
//! Dropping a unit of work without calling [`UnitOfWork::commit`] discards every
//! write made through it.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use trustgate_access::{
    Bundle, GatedAccessGrant, GatedAccessRequest, NdaSignature, PortalGrants, Redemption,
    RedemptionCode, SimpleAccessRequest,
};
use trustgate_auth::{AccessToken, TokenOrigin};
use trustgate_core::{
    Affected, BundleId, CodeId, Email, GatedRequestId, ItemRef, RequestId, RequestStatus,
    SignatureId, StaffId,
};

pub use in_memory::InMemoryAccessStore;
pub use postgres::PostgresAccessStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A unique constraint rejected the write (duplicate code, duplicate id).
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// A stored row could not be decoded into a domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Connectivity, pool or driver failure.
    #[error("storage error: {0}")]
    Backend(String),
}

/// Which request a status transition applies to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransitionTarget {
    Simple(RequestId),
    Gated(GatedRequestId),
}

/// Review metadata written together with a status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub reviewed_at: DateTime<Utc>,
    pub reviewed_by: StaffId,
    /// Gated requests only; ignored for portal requests.
    pub rejection_reason: Option<String>,
}

impl Review {
    pub fn new(reviewed_at: DateTime<Utc>, reviewed_by: StaffId) -> Self {
        Self {
            reviewed_at,
            reviewed_by,
            rejection_reason: None,
        }
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.rejection_reason = reason;
        self
    }
}

#[async_trait]
pub trait AccessStore: Send + Sync {
    /// Start an atomic unit of work.
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;

    // Resources Portal

    async fn find_simple_request(&self, id: RequestId) -> StoreResult<Option<SimpleAccessRequest>>;

    /// Newest-first; `None` lists every status.
    async fn list_simple_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<SimpleAccessRequest>>;

    async fn simple_requests_for(&self, email: &Email) -> StoreResult<Vec<SimpleAccessRequest>>;

    // Trust Center

    async fn find_gated_request(
        &self,
        id: GatedRequestId,
    ) -> StoreResult<Option<GatedAccessRequest>>;

    /// Newest-first; `None` lists every status.
    async fn list_gated_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<GatedAccessRequest>>;

    async fn find_signature(&self, id: SignatureId) -> StoreResult<Option<NdaSignature>>;

    async fn grants_for(&self, email: &Email) -> StoreResult<Vec<GatedAccessGrant>>;

    /// Remove the single grant for `(email, item)`.
    async fn delete_grant(&self, email: &Email, item: ItemRef) -> StoreResult<Affected>;

    // Tokens

    async fn find_token(&self, token: &str) -> StoreResult<Option<AccessToken>>;

    // Bundles

    async fn insert_bundle(&self, bundle: &Bundle) -> StoreResult<()>;

    async fn find_bundle(&self, id: BundleId) -> StoreResult<Option<Bundle>>;

    async fn list_bundles(&self) -> StoreResult<Vec<Bundle>>;

    /// Fails with [`StoreError::Duplicate`] when the code string is taken.
    async fn insert_code(&self, code: &RedemptionCode) -> StoreResult<()>;

    async fn find_code(&self, id: CodeId) -> StoreResult<Option<RedemptionCode>>;

    /// Lookup by the normalized (upper-case) code string.
    async fn find_code_by_value(&self, code: &str) -> StoreResult<Option<RedemptionCode>>;

    async fn list_codes(&self, bundle_id: BundleId) -> StoreResult<Vec<RedemptionCode>>;

    /// Deletes the code and its redemption rows. Grants already handed out stay.
    async fn delete_code(&self, id: CodeId) -> StoreResult<Affected>;

    async fn redemptions_for(&self, code_id: CodeId) -> StoreResult<Vec<Redemption>>;
}

/// Atomic write scope.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Move `target` from `expected` to `next` iff it is currently `expected`.
    async fn compare_and_transition(
        &mut self,
        target: TransitionTarget,
        expected: RequestStatus,
        next: RequestStatus,
        review: &Review,
    ) -> StoreResult<Affected>;

    /// Replace a portal request's grants iff it is currently approved.
    async fn update_simple_grants(
        &mut self,
        id: RequestId,
        grants: &PortalGrants,
    ) -> StoreResult<Affected>;

    /// Insert unless the email already has a pending or approved request.
    /// Returns whether a row was written.
    async fn insert_simple_request(&mut self, request: &SimpleAccessRequest) -> StoreResult<bool>;

    async fn insert_signature(&mut self, signature: &NdaSignature) -> StoreResult<()>;

    async fn insert_gated_request(&mut self, request: &GatedAccessRequest) -> StoreResult<()>;

    async fn insert_token(&mut self, token: &AccessToken) -> StoreResult<()>;

    /// Drop every token issued for `origin`. Returns the number removed.
    async fn delete_tokens_for(&mut self, origin: TokenOrigin) -> StoreResult<u64>;

    /// Insert the grant, or replace the existing `(email, item)` grant only
    /// when the new one expires later. Returns whether a row was written.
    async fn merge_grant(&mut self, grant: &GatedAccessGrant) -> StoreResult<bool>;

    /// Record `(code, email)` unless already recorded. Returns whether this is
    /// the first redemption for the pair.
    async fn insert_redemption_if_absent(&mut self, redemption: &Redemption) -> StoreResult<bool>;

    /// `redeemed_count += 1` iff the code is below its cap (or uncapped).
    async fn increment_redemptions(&mut self, code_id: CodeId) -> StoreResult<Affected>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
impl<S> AccessStore for std::sync::Arc<S>
where
    S: AccessStore + ?Sized,
{
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        (**self).begin().await
    }

    async fn find_simple_request(&self, id: RequestId) -> StoreResult<Option<SimpleAccessRequest>> {
        (**self).find_simple_request(id).await
    }

    async fn list_simple_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<SimpleAccessRequest>> {
        (**self).list_simple_requests(status).await
    }

    async fn simple_requests_for(&self, email: &Email) -> StoreResult<Vec<SimpleAccessRequest>> {
        (**self).simple_requests_for(email).await
    }

    async fn find_gated_request(
        &self,
        id: GatedRequestId,
    ) -> StoreResult<Option<GatedAccessRequest>> {
        (**self).find_gated_request(id).await
    }

    async fn list_gated_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<GatedAccessRequest>> {
        (**self).list_gated_requests(status).await
    }

    async fn find_signature(&self, id: SignatureId) -> StoreResult<Option<NdaSignature>> {
        (**self).find_signature(id).await
    }

    async fn grants_for(&self, email: &Email) -> StoreResult<Vec<GatedAccessGrant>> {
        (**self).grants_for(email).await
    }

    async fn delete_grant(&self, email: &Email, item: ItemRef) -> StoreResult<Affected> {
        (**self).delete_grant(email, item).await
    }

    async fn find_token(&self, token: &str) -> StoreResult<Option<AccessToken>> {
        (**self).find_token(token).await
    }

    async fn insert_bundle(&self, bundle: &Bundle) -> StoreResult<()> {
        (**self).insert_bundle(bundle).await
    }

    async fn find_bundle(&self, id: BundleId) -> StoreResult<Option<Bundle>> {
        (**self).find_bundle(id).await
    }

    async fn list_bundles(&self) -> StoreResult<Vec<Bundle>> {
        (**self).list_bundles().await
    }

    async fn insert_code(&self, code: &RedemptionCode) -> StoreResult<()> {
        (**self).insert_code(code).await
    }

    async fn find_code(&self, id: CodeId) -> StoreResult<Option<RedemptionCode>> {
        (**self).find_code(id).await
    }

    async fn find_code_by_value(&self, code: &str) -> StoreResult<Option<RedemptionCode>> {
        (**self).find_code_by_value(code).await
    }

    async fn list_codes(&self, bundle_id: BundleId) -> StoreResult<Vec<RedemptionCode>> {
        (**self).list_codes(bundle_id).await
    }

    async fn delete_code(&self, id: CodeId) -> StoreResult<Affected> {
        (**self).delete_code(id).await
    }

    async fn redemptions_for(&self, code_id: CodeId) -> StoreResult<Vec<Redemption>> {
        (**self).redemptions_for(code_id).await
    }
}
