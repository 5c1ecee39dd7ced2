//! In-memory grant store for tests/dev.
//!
//! A unit of work takes the store lock for its whole lifetime and writes into a
//! private copy of the state; `commit` swaps the copy in. Units of work are
//! therefore serialized, and a dropped one leaves no trace.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use trustgate_access::{
    Bundle, GatedAccessGrant, GatedAccessRequest, NdaSignature, PortalGrants, Redemption,
    RedemptionCode, SimpleAccessRequest,
};
use trustgate_auth::{AccessToken, TokenOrigin};
use trustgate_core::{
    Affected, BundleId, CodeId, Email, GatedRequestId, ItemRef, RequestId, RequestStatus,
    SignatureId,
};

use super::{AccessStore, Review, StoreError, StoreResult, TransitionTarget, UnitOfWork};

#[derive(Debug, Default, Clone)]
struct State {
    simple: HashMap<RequestId, SimpleAccessRequest>,
    gated: HashMap<GatedRequestId, GatedAccessRequest>,
    signatures: HashMap<SignatureId, NdaSignature>,
    grants: HashMap<(Email, ItemRef), GatedAccessGrant>,
    tokens: HashMap<String, AccessToken>,
    bundles: HashMap<BundleId, Bundle>,
    codes: HashMap<CodeId, RedemptionCode>,
    redemptions: HashMap<(CodeId, Email), Redemption>,
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryAccessStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryAccessStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn filter_status<T: Clone>(
    rows: impl Iterator<Item = T>,
    status: Option<RequestStatus>,
    status_of: impl Fn(&T) -> RequestStatus,
    created_of: impl Fn(&T) -> chrono::DateTime<chrono::Utc>,
) -> Vec<T> {
    let mut out: Vec<T> = rows
        .filter(|r| status.is_none_or(|s| status_of(r) == s))
        .collect();
    out.sort_by_key(|r| std::cmp::Reverse(created_of(r)));
    out
}

#[async_trait]
impl AccessStore for InMemoryAccessStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork { guard, working }))
    }

    async fn find_simple_request(&self, id: RequestId) -> StoreResult<Option<SimpleAccessRequest>> {
        Ok(self.state.lock().await.simple.get(&id).cloned())
    }

    async fn list_simple_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<SimpleAccessRequest>> {
        let state = self.state.lock().await;
        Ok(filter_status(
            state.simple.values().cloned(),
            status,
            |r| r.status,
            |r| r.created_at,
        ))
    }

    async fn simple_requests_for(&self, email: &Email) -> StoreResult<Vec<SimpleAccessRequest>> {
        let state = self.state.lock().await;
        Ok(filter_status(
            state.simple.values().filter(|r| &r.email == email).cloned(),
            None,
            |r| r.status,
            |r| r.created_at,
        ))
    }

    async fn find_gated_request(
        &self,
        id: GatedRequestId,
    ) -> StoreResult<Option<GatedAccessRequest>> {
        Ok(self.state.lock().await.gated.get(&id).cloned())
    }

    async fn list_gated_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> StoreResult<Vec<GatedAccessRequest>> {
        let state = self.state.lock().await;
        Ok(filter_status(
            state.gated.values().cloned(),
            status,
            |r| r.status,
            |r| r.created_at,
        ))
    }

    async fn find_signature(&self, id: SignatureId) -> StoreResult<Option<NdaSignature>> {
        Ok(self.state.lock().await.signatures.get(&id).cloned())
    }

    async fn grants_for(&self, email: &Email) -> StoreResult<Vec<GatedAccessGrant>> {
        let state = self.state.lock().await;
        Ok(state
            .grants
            .values()
            .filter(|g| &g.email == email)
            .cloned()
            .collect())
    }

    async fn delete_grant(&self, email: &Email, item: ItemRef) -> StoreResult<Affected> {
        let mut state = self.state.lock().await;
        let removed = state.grants.remove(&(email.clone(), item)).is_some();
        Ok(Affected::from(removed as u64))
    }

    async fn find_token(&self, token: &str) -> StoreResult<Option<AccessToken>> {
        Ok(self.state.lock().await.tokens.get(token).cloned())
    }

    async fn insert_bundle(&self, bundle: &Bundle) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.bundles.contains_key(&bundle.id) {
            return Err(StoreError::Duplicate(format!("bundle {}", bundle.id)));
        }
        state.bundles.insert(bundle.id, bundle.clone());
        Ok(())
    }

    async fn find_bundle(&self, id: BundleId) -> StoreResult<Option<Bundle>> {
        Ok(self.state.lock().await.bundles.get(&id).cloned())
    }

    async fn list_bundles(&self) -> StoreResult<Vec<Bundle>> {
        let state = self.state.lock().await;
        let mut bundles: Vec<Bundle> = state.bundles.values().cloned().collect();
        bundles.sort_by_key(|b| std::cmp::Reverse(b.created_at));
        Ok(bundles)
    }

    async fn insert_code(&self, code: &RedemptionCode) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.codes.values().any(|c| c.code == code.code) {
            return Err(StoreError::Duplicate(format!("code {}", code.code)));
        }
        state.codes.insert(code.id, code.clone());
        Ok(())
    }

    async fn find_code(&self, id: CodeId) -> StoreResult<Option<RedemptionCode>> {
        Ok(self.state.lock().await.codes.get(&id).cloned())
    }

    async fn find_code_by_value(&self, code: &str) -> StoreResult<Option<RedemptionCode>> {
        let state = self.state.lock().await;
        Ok(state.codes.values().find(|c| c.code == code).cloned())
    }

    async fn list_codes(&self, bundle_id: BundleId) -> StoreResult<Vec<RedemptionCode>> {
        let state = self.state.lock().await;
        let mut codes: Vec<RedemptionCode> = state
            .codes
            .values()
            .filter(|c| c.bundle_id == bundle_id)
            .cloned()
            .collect();
        codes.sort_by_key(|c| std::cmp::Reverse(c.created_at));
        Ok(codes)
    }

    async fn delete_code(&self, id: CodeId) -> StoreResult<Affected> {
        let mut state = self.state.lock().await;
        let removed = state.codes.remove(&id).is_some();
        state.redemptions.retain(|(code_id, _), _| *code_id != id);
        Ok(Affected::from(removed as u64))
    }

    async fn redemptions_for(&self, code_id: CodeId) -> StoreResult<Vec<Redemption>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Redemption> = state
            .redemptions
            .values()
            .filter(|r| r.code_id == code_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.redeemed_at);
        Ok(rows)
    }
}

struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<State>,
    working: State,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn compare_and_transition(
        &mut self,
        target: TransitionTarget,
        expected: RequestStatus,
        next: RequestStatus,
        review: &Review,
    ) -> StoreResult<Affected> {
        match target {
            TransitionTarget::Simple(id) => match self.working.simple.get_mut(&id) {
                Some(row) if row.status == expected => {
                    row.status = next;
                    row.reviewed_at = Some(review.reviewed_at);
                    row.reviewed_by = Some(review.reviewed_by);
                    Ok(Affected::ONE)
                }
                _ => Ok(Affected::NONE),
            },
            TransitionTarget::Gated(id) => match self.working.gated.get_mut(&id) {
                Some(row) if row.status == expected => {
                    row.status = next;
                    row.reviewed_at = Some(review.reviewed_at);
                    row.reviewed_by = Some(review.reviewed_by);
                    row.rejection_reason = review.rejection_reason.clone();
                    Ok(Affected::ONE)
                }
                _ => Ok(Affected::NONE),
            },
        }
    }

    async fn update_simple_grants(
        &mut self,
        id: RequestId,
        grants: &PortalGrants,
    ) -> StoreResult<Affected> {
        match self.working.simple.get_mut(&id) {
            Some(row) if row.status == RequestStatus::Approved => {
                row.grants = grants.clone();
                Ok(Affected::ONE)
            }
            _ => Ok(Affected::NONE),
        }
    }

    async fn insert_simple_request(&mut self, request: &SimpleAccessRequest) -> StoreResult<bool> {
        let open = self
            .working
            .simple
            .values()
            .any(|r| r.email == request.email && r.is_open());
        if open {
            return Ok(false);
        }
        self.working.simple.insert(request.id, request.clone());
        Ok(true)
    }

    async fn insert_signature(&mut self, signature: &NdaSignature) -> StoreResult<()> {
        if self.working.signatures.contains_key(&signature.id) {
            return Err(StoreError::Duplicate(format!("signature {}", signature.id)));
        }
        self.working.signatures.insert(signature.id, signature.clone());
        Ok(())
    }

    async fn insert_gated_request(&mut self, request: &GatedAccessRequest) -> StoreResult<()> {
        if self.working.gated.contains_key(&request.id) {
            return Err(StoreError::Duplicate(format!("gated request {}", request.id)));
        }
        self.working.gated.insert(request.id, request.clone());
        Ok(())
    }

    async fn insert_token(&mut self, token: &AccessToken) -> StoreResult<()> {
        if self.working.tokens.contains_key(&token.token) {
            return Err(StoreError::Duplicate("token".to_string()));
        }
        self.working.tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn delete_tokens_for(&mut self, origin: TokenOrigin) -> StoreResult<u64> {
        let before = self.working.tokens.len();
        self.working.tokens.retain(|_, t| t.origin != origin);
        Ok((before - self.working.tokens.len()) as u64)
    }

    async fn merge_grant(&mut self, grant: &GatedAccessGrant) -> StoreResult<bool> {
        let key = (grant.email.clone(), grant.item);
        match self.working.grants.get(&key) {
            Some(existing) if !grant.outlasts(existing) => Ok(false),
            _ => {
                self.working.grants.insert(key, grant.clone());
                Ok(true)
            }
        }
    }

    async fn insert_redemption_if_absent(&mut self, redemption: &Redemption) -> StoreResult<bool> {
        let key = (redemption.code_id, redemption.email.clone());
        if self.working.redemptions.contains_key(&key) {
            return Ok(false);
        }
        self.working.redemptions.insert(key, redemption.clone());
        Ok(true)
    }

    async fn increment_redemptions(&mut self, code_id: CodeId) -> StoreResult<Affected> {
        match self.working.codes.get_mut(&code_id) {
            Some(code) if code.has_capacity() => {
                code.redeemed_count += 1;
                Ok(Affected::ONE)
            }
            _ => Ok(Affected::NONE),
        }
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
