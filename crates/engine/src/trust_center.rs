//! Trust Center (NDA-gated) workflow.
//!
//! A submission stores the NDA signature and the request together. Approval is
//! one unit of work: status transition, one grant per item, one token. Each
//! request leaves `pending` exactly once.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use trustgate_access::grant::expiry_after_days;
use trustgate_access::trust::{approval_targets, validate_reason};
use trustgate_access::{GatedAccessGrant, GatedAccessRequest, GatedSubmission, GrantSource, SubmissionInput};
use trustgate_auth::{AccessToken, Permission, StaffPrincipal, TokenOrigin};
use trustgate_core::{AgreementId, DomainError, Email, GatedRequestId, ItemRef, RequestStatus};
use trustgate_infra::{AccessStore, Catalog, Review, TransitionTarget};
use trustgate_notify::Notification;

use crate::{AccessEngine, AccessError, AccessResult, ClientContext, ReviewOutcome};

pub const RATE_TRUST_SUBMIT_IP: &str = "trust_submit_ip";
pub const RATE_TRUST_SUBMIT_EMAIL: &str = "trust_submit_email";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatedSubmissionRequest {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub company: Option<String>,
    pub agreement_id: AgreementId,
    pub accepted_nda: bool,
    #[serde(default)]
    pub items: Vec<ItemRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatedSubmitted {
    pub request: GatedAccessRequest,
    pub notified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatedApprovalOptions {
    /// Grants expire this many days after approval; absent or 0 never expires.
    #[serde(default)]
    pub grant_expiry_days: Option<u32>,
    #[serde(default = "default_send_email")]
    pub send_email: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatedRejectionOptions {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default = "default_send_email")]
    pub send_email: bool,
}

fn default_send_email() -> bool {
    true
}

impl Default for GatedApprovalOptions {
    fn default() -> Self {
        Self {
            grant_expiry_days: None,
            send_email: true,
        }
    }
}

impl Default for GatedRejectionOptions {
    fn default() -> Self {
        Self {
            reason: None,
            send_email: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatedApproval {
    pub request: GatedAccessRequest,
    pub grants: Vec<GatedAccessGrant>,
    pub token: AccessToken,
    pub notified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatedResend {
    pub request_id: GatedRequestId,
    pub token: AccessToken,
    /// Earlier tokens removed because of the supersede policy.
    pub superseded: u64,
    pub notified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure<Id> {
    pub id: Id,
    pub code: &'static str,
    pub message: String,
}

/// Per-id tally of a bulk review. Every id lands in exactly one list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkOutcome<Id> {
    pub succeeded: Vec<Id>,
    pub failed: Vec<BulkFailure<Id>>,
}

impl<Id> BulkOutcome<Id> {
    fn new() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    fn record<T>(&mut self, id: Id, result: Result<T, AccessError>) {
        match result {
            Ok(_) => self.succeeded.push(id),
            Err(err) => self.failed.push(BulkFailure {
                id,
                code: err.code(),
                message: err.to_string(),
            }),
        }
    }
}

impl AccessEngine {
    #[instrument(skip(self, input, client), fields(agreement_id = %input.agreement_id), err)]
    pub async fn submit_gated_request(
        &self,
        input: GatedSubmissionRequest,
        client: &ClientContext,
    ) -> AccessResult<GatedSubmitted> {
        let limits = &self.config.rate_limits;
        self.throttle(RATE_TRUST_SUBMIT_IP, client.rate_identity(), &limits.trust_submit_ip)
            .await?;
        let email = Email::parse(&input.email)?;
        self.throttle(RATE_TRUST_SUBMIT_EMAIL, email.as_str(), &limits.trust_submit_email)
            .await?;

        let agreement = self.catalog.find_agreement(input.agreement_id).await?;
        let catalog = self.catalog.list_gated_status().await?;
        let submission = GatedSubmission::build(
            SubmissionInput {
                email,
                name: input.name,
                company: input.company,
                accepted_nda: input.accepted_nda,
                items: input.items,
                ip_address: client.ip_address.clone(),
            },
            agreement.as_ref(),
            &catalog,
            self.now(),
        )?;

        let mut uow = self.store.begin().await?;
        uow.insert_signature(&submission.signature).await?;
        uow.insert_gated_request(&submission.request).await?;
        uow.commit().await?;

        let request = submission.request;
        tracing::info!(
            request_id = %request.id,
            items = request.requested_items.len(),
            "trust center request submitted"
        );

        let notified = self
            .deliver(Notification::TrustRequestSubmitted {
                request_id: request.id,
                email: request.email.clone(),
                name: request.name.clone(),
                company: request.company.clone(),
                item_count: request.requested_items.len(),
            })
            .await;

        Ok(GatedSubmitted { request, notified })
    }

    /// `pending -> approved` with grants and a 90-day token, all or nothing.
    #[instrument(skip(self, principal), fields(request_id = %id, staff_id = %principal.staff_id), err)]
    pub async fn approve_gated(
        &self,
        id: GatedRequestId,
        options: GatedApprovalOptions,
        principal: &StaffPrincipal,
    ) -> AccessResult<GatedApproval> {
        self.require(principal, &Permission::REVIEW_REQUESTS)?;
        let mut request = self.gated_request(id).await?;
        let catalog = self.catalog.list_gated_status().await?;

        let now = self.now();
        let review = Review::new(now, principal.staff_id);
        let expires_at = expiry_after_days(now, options.grant_expiry_days)?;
        let grants: Vec<GatedAccessGrant> = approval_targets(&request, &catalog)
            .into_iter()
            .map(|item| {
                GatedAccessGrant::new(
                    request.email.clone(),
                    item,
                    expires_at,
                    Some(principal.staff_id),
                    GrantSource::Nda,
                    now,
                )
            })
            .collect();

        let mut uow = self.store.begin().await?;
        uow.compare_and_transition(
            TransitionTarget::Gated(id),
            RequestStatus::Pending,
            RequestStatus::Approved,
            &review,
        )
        .await?
        .require("request already reviewed")?;
        for grant in &grants {
            uow.merge_grant(grant).await?;
        }
        let token = self
            .stage_token(
                uow.as_mut(),
                &request.email,
                TokenOrigin::TrustCenter(id),
                self.config.trust_token_ttl(),
            )
            .await?;
        uow.commit().await?;
        tracing::info!(grants = grants.len(), "trust center request approved");

        request.status = RequestStatus::Approved;
        request.reviewed_at = Some(review.reviewed_at);
        request.reviewed_by = Some(review.reviewed_by);

        let notified = if options.send_email {
            self.deliver(Notification::TrustApproved {
                request_id: id,
                email: request.email.clone(),
                token: token.token.clone(),
                token_expires_at: token.expires_at,
                grants_expire_at: expires_at,
                item_count: grants.len(),
            })
            .await
        } else {
            false
        };

        Ok(GatedApproval {
            request,
            grants,
            token,
            notified,
        })
    }

    #[instrument(skip(self, options, principal), fields(request_id = %id, staff_id = %principal.staff_id), err)]
    pub async fn reject_gated(
        &self,
        id: GatedRequestId,
        options: GatedRejectionOptions,
        principal: &StaffPrincipal,
    ) -> AccessResult<ReviewOutcome<GatedRequestId>> {
        self.require(principal, &Permission::REVIEW_REQUESTS)?;
        let reason = validate_reason(options.reason)?;
        let request = self.gated_request(id).await?;
        let review = Review::new(self.now(), principal.staff_id).with_reason(reason.clone());

        let mut uow = self.store.begin().await?;
        uow.compare_and_transition(
            TransitionTarget::Gated(id),
            RequestStatus::Pending,
            RequestStatus::Rejected,
            &review,
        )
        .await?
        .require("request already reviewed")?;
        uow.commit().await?;
        tracing::info!("trust center request rejected");

        let notified = if options.send_email {
            self.deliver(Notification::TrustRejected {
                request_id: id,
                email: request.email,
                reason,
            })
            .await
        } else {
            false
        };

        Ok(ReviewOutcome {
            request_id: id,
            status: RequestStatus::Rejected,
            notified,
        })
    }

    /// Approve each id independently; one failure never stops the rest.
    #[instrument(skip(self, ids, principal), fields(count = ids.len(), staff_id = %principal.staff_id), err)]
    pub async fn bulk_approve_gated(
        &self,
        ids: &[GatedRequestId],
        options: GatedApprovalOptions,
        principal: &StaffPrincipal,
    ) -> AccessResult<BulkOutcome<GatedRequestId>> {
        self.require(principal, &Permission::REVIEW_REQUESTS)?;
        expiry_after_days(self.now(), options.grant_expiry_days)?;
        let mut outcome = BulkOutcome::new();
        for &id in ids {
            let result = self.approve_gated(id, options, principal).await;
            outcome.record(id, result);
        }
        tracing::info!(
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "bulk approve finished"
        );
        Ok(outcome)
    }

    #[instrument(skip(self, ids, reason, principal), fields(count = ids.len(), staff_id = %principal.staff_id), err)]
    pub async fn bulk_reject_gated(
        &self,
        ids: &[GatedRequestId],
        reason: Option<String>,
        principal: &StaffPrincipal,
    ) -> AccessResult<BulkOutcome<GatedRequestId>> {
        self.require(principal, &Permission::REVIEW_REQUESTS)?;
        let reason = validate_reason(reason)?;
        let mut outcome = BulkOutcome::new();
        for &id in ids {
            let options = GatedRejectionOptions {
                reason: reason.clone(),
                send_email: true,
            };
            let result = self.reject_gated(id, options, principal).await;
            outcome.record(id, result);
        }
        tracing::info!(
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "bulk reject finished"
        );
        Ok(outcome)
    }

    /// Issue a fresh token for an approved request. Earlier tokens stay valid
    /// unless `supersede_tokens_on_resend` is set.
    #[instrument(skip(self, principal), fields(request_id = %id, staff_id = %principal.staff_id), err)]
    pub async fn resend_gated_link(
        &self,
        id: GatedRequestId,
        principal: &StaffPrincipal,
    ) -> AccessResult<GatedResend> {
        self.require(principal, &Permission::REVIEW_REQUESTS)?;
        let request = self.gated_request(id).await?;
        if request.status != RequestStatus::Approved {
            return Err(DomainError::conflict("only approved requests can be resent").into());
        }

        let origin = TokenOrigin::TrustCenter(id);
        let mut uow = self.store.begin().await?;
        let superseded = if self.config.supersede_tokens_on_resend {
            uow.delete_tokens_for(origin).await?
        } else {
            0
        };
        let token = self
            .stage_token(uow.as_mut(), &request.email, origin, self.config.trust_token_ttl())
            .await?;
        uow.commit().await?;
        tracing::info!(superseded, "trust center link resent");

        let notified = self
            .deliver(Notification::TrustLinkResent {
                request_id: id,
                email: request.email,
                token: token.token.clone(),
                token_expires_at: token.expires_at,
            })
            .await;

        Ok(GatedResend {
            request_id: id,
            token,
            superseded,
            notified,
        })
    }

    pub async fn list_gated_requests(
        &self,
        status: Option<RequestStatus>,
        principal: &StaffPrincipal,
    ) -> AccessResult<Vec<GatedAccessRequest>> {
        self.require(principal, &Permission::REVIEW_REQUESTS)?;
        Ok(self.store.list_gated_requests(status).await?)
    }

    async fn gated_request(&self, id: GatedRequestId) -> AccessResult<GatedAccessRequest> {
        self.store
            .find_gated_request(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("request {id}")).into())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use trustgate_auth::Identity;
    use trustgate_core::{Clock, ItemId};

    use crate::testing::Harness;

    use super::*;

    fn submission(h: &Harness, email: &str, items: Vec<ItemRef>) -> GatedSubmissionRequest {
        GatedSubmissionRequest {
            email: email.to_string(),
            name: "Grace Hopper".to_string(),
            company: Some("Navy".to_string()),
            agreement_id: h.catalog.add_agreement("Mutual NDA", "v3", true),
            accepted_nda: true,
            items,
        }
    }

    async fn submit(h: &Harness, email: &str, items: Vec<ItemRef>) -> GatedAccessRequest {
        let input = submission(h, email, items);
        h.engine
            .submit_gated_request(input, &ClientContext::from_ip("10.1.1.1"))
            .await
            .unwrap()
            .request
    }

    fn approve_for(days: Option<u32>) -> GatedApprovalOptions {
        GatedApprovalOptions {
            grant_expiry_days: days,
            send_email: true,
        }
    }

    #[tokio::test]
    async fn submit_requires_accepted_nda_and_live_agreement() {
        let h = Harness::new();
        let mut input = submission(&h, "a@x.com", vec![]);
        input.accepted_nda = false;
        let err = h
            .engine
            .submit_gated_request(input, &ClientContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation");

        let mut input = submission(&h, "a@x.com", vec![]);
        input.agreement_id = h.catalog.add_agreement("Old NDA", "v1", false);
        let err = h
            .engine
            .submit_gated_request(input, &ClientContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation");
        assert!(h.engine.list_gated_requests(None, &h.reviewer()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn submit_drops_public_and_unknown_items_and_keeps_signature() {
        let h = Harness::new();
        let unknown = ItemRef::Resource(ItemId::new());
        let request = submit(&h, "a@x.com", vec![h.gated[0], h.public, unknown, h.gated[0]]).await;

        assert_eq!(request.requested_items, vec![h.gated[0]]);
        assert_eq!(request.status, RequestStatus::Pending);
        let signature = h
            .engine
            .store()
            .find_signature(request.nda_signature_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signature.ip_address.as_deref(), Some("10.1.1.1"));
        assert!(h.notifier.last_of("trust_request_submitted").is_some());
    }

    #[tokio::test]
    async fn submissions_are_limited_per_email_and_per_ip() {
        let h = Harness::new();
        for _ in 0..3 {
            let input = submission(&h, "spam@x.com", vec![]);
            h.engine
                .submit_gated_request(input, &ClientContext::from_ip("10.9.9.9"))
                .await
                .unwrap();
        }
        let input = submission(&h, "spam@x.com", vec![]);
        let err = h
            .engine
            .submit_gated_request(input, &ClientContext::from_ip("10.9.9.10"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "rate_limited");

        let input = submission(&h, "fresh@x.com", vec![]);
        assert!(h
            .engine
            .submit_gated_request(input, &ClientContext::from_ip("10.9.9.10"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn grant_expiry_is_decoupled_from_token_expiry() {
        let h = Harness::new();
        let request = submit(&h, "a@x.com", vec![h.gated[0]]).await;
        let approval = h
            .engine
            .approve_gated(request.id, approve_for(Some(30)), &h.reviewer())
            .await
            .unwrap();

        let start = h.clock.now();
        assert_eq!(approval.grants.len(), 1);
        assert_eq!(approval.grants[0].expires_at, Some(start + Duration::days(30)));
        assert_eq!(approval.token.expires_at, start + Duration::days(90));

        let identity = Identity::new("a@x.com", approval.token.token.clone()).unwrap();
        assert!(h.engine.has_access(&identity, h.gated[0]).await.unwrap());

        h.clock.advance(Duration::days(31));
        assert!(!h.engine.has_access(&identity, h.gated[0]).await.unwrap());
        assert!(h.engine.verify_token(&identity).await.unwrap().valid);
    }

    #[tokio::test]
    async fn approval_without_items_grants_every_gated_item_forever() {
        let h = Harness::new();
        let request = submit(&h, "a@x.com", vec![]).await;
        let approval = h
            .engine
            .approve_gated(request.id, approve_for(Some(0)), &h.reviewer())
            .await
            .unwrap();

        assert_eq!(approval.grants.len(), h.gated.len());
        assert!(approval.grants.iter().all(|g| g.expires_at.is_none()));
        assert!(approval.grants.iter().all(|g| g.source == GrantSource::Nda));

        let identity = Identity::new("a@x.com", approval.token.token).unwrap();
        h.clock.advance(Duration::days(89));
        for item in &h.gated {
            assert!(h.engine.has_access(&identity, *item).await.unwrap());
        }
    }

    #[tokio::test]
    async fn second_review_conflicts_and_changes_nothing() {
        let h = Harness::new();
        let request = submit(&h, "a@x.com", vec![h.gated[0]]).await;
        let approval = h
            .engine
            .approve_gated(request.id, approve_for(None), &h.reviewer())
            .await
            .unwrap();

        let again = h
            .engine
            .approve_gated(request.id, approve_for(Some(1)), &h.reviewer())
            .await
            .unwrap_err();
        assert!(again.is_conflict());
        let reject = h
            .engine
            .reject_gated(request.id, GatedRejectionOptions::default(), &h.reviewer())
            .await
            .unwrap_err();
        assert!(reject.is_conflict());

        let email = Email::parse("a@x.com").unwrap();
        let grants = h.engine.store().grants_for(&email).await.unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].expires_at, None);
        let identity = Identity::new("a@x.com", approval.token.token).unwrap();
        assert!(h.engine.verify_token(&identity).await.unwrap().valid);
    }

    #[tokio::test]
    async fn reject_records_reason_and_respects_send_email() {
        let h = Harness::new();
        let request = submit(&h, "a@x.com", vec![]).await;
        let out = h
            .engine
            .reject_gated(
                request.id,
                GatedRejectionOptions {
                    reason: Some("  not a customer ".into()),
                    send_email: false,
                },
                &h.reviewer(),
            )
            .await
            .unwrap();
        assert!(!out.notified);
        assert!(h.notifier.last_of("trust_rejected").is_none());

        let stored = h.engine.store().find_gated_request(request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Rejected);
        assert_eq!(stored.rejection_reason.as_deref(), Some("not a customer"));
        let email = Email::parse("a@x.com").unwrap();
        assert!(h.engine.store().grants_for(&email).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bulk_approve_reports_each_id() {
        let h = Harness::new();
        let a = submit(&h, "a@x.com", vec![h.gated[0]]).await;
        let b = submit(&h, "b@x.com", vec![h.gated[1]]).await;
        h.engine
            .reject_gated(b.id, GatedRejectionOptions::default(), &h.reviewer())
            .await
            .unwrap();
        let missing = GatedRequestId::new();

        let out = h
            .engine
            .bulk_approve_gated(&[a.id, b.id, missing], approve_for(None), &h.reviewer())
            .await
            .unwrap();
        assert_eq!(out.succeeded, vec![a.id]);
        assert_eq!(out.failed.len(), 2);
        assert_eq!(out.failed[0].id, b.id);
        assert_eq!(out.failed[0].code, "conflict");
        assert_eq!(out.failed[1].code, "not_found");
    }

    #[tokio::test]
    async fn bulk_reject_skips_reviewed_requests() {
        let h = Harness::new();
        let a = submit(&h, "a@x.com", vec![]).await;
        let b = submit(&h, "b@x.com", vec![]).await;
        h.engine
            .approve_gated(a.id, approve_for(None), &h.reviewer())
            .await
            .unwrap();

        let out = h
            .engine
            .bulk_reject_gated(&[a.id, b.id], Some("batch".into()), &h.reviewer())
            .await
            .unwrap();
        assert_eq!(out.succeeded, vec![b.id]);
        assert_eq!(out.failed[0].id, a.id);
    }

    #[tokio::test]
    async fn resend_keeps_old_tokens_by_default() {
        let h = Harness::new();
        let request = submit(&h, "a@x.com", vec![]).await;
        let approval = h
            .engine
            .approve_gated(request.id, approve_for(None), &h.reviewer())
            .await
            .unwrap();

        h.clock.advance(Duration::days(10));
        let resent = h.engine.resend_gated_link(request.id, &h.reviewer()).await.unwrap();
        assert_eq!(resent.superseded, 0);
        assert_eq!(resent.token.expires_at, h.clock.now() + Duration::days(90));
        assert_ne!(resent.token.token, approval.token.token);

        let old = Identity::new("a@x.com", approval.token.token).unwrap();
        let new = Identity::new("a@x.com", resent.token.token).unwrap();
        assert!(h.engine.verify_token(&old).await.unwrap().valid);
        assert!(h.engine.verify_token(&new).await.unwrap().valid);
        assert!(h.notifier.last_of("trust_link_resent").is_some());
    }

    #[tokio::test]
    async fn resend_can_supersede_old_tokens() {
        let mut config = crate::EngineConfig::default();
        config.supersede_tokens_on_resend = true;
        let h = Harness::with_config(config);
        let request = submit(&h, "a@x.com", vec![]).await;
        let approval = h
            .engine
            .approve_gated(request.id, approve_for(None), &h.reviewer())
            .await
            .unwrap();

        let resent = h.engine.resend_gated_link(request.id, &h.reviewer()).await.unwrap();
        assert_eq!(resent.superseded, 1);
        let old = Identity::new("a@x.com", approval.token.token).unwrap();
        assert!(!h.engine.verify_token(&old).await.unwrap().valid);
    }

    #[tokio::test]
    async fn resend_requires_approved_request() {
        let h = Harness::new();
        let request = submit(&h, "a@x.com", vec![]).await;
        let err = h.engine.resend_gated_link(request.id, &h.reviewer()).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn oversized_grant_expiry_is_rejected_before_any_write() {
        let h = Harness::new();
        let request = submit(&h, "a@x.com", vec![h.gated[0]]).await;

        let err = h
            .engine
            .approve_gated(request.id, approve_for(Some(200_000_000)), &h.reviewer())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation");
        let err = h
            .engine
            .bulk_approve_gated(&[request.id], approve_for(Some(u32::MAX)), &h.reviewer())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation");

        let stored = h.engine.store().find_gated_request(request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Pending);
        let email = Email::parse("a@x.com").unwrap();
        assert!(h.engine.store().grants_for(&email).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn approval_never_shortens_a_redeemed_bundle_grant() {
        let h = Harness::new();
        let staff = h.admin();
        let bundle = h
            .engine
            .create_bundle("Launch kit", vec![h.gated[0]], &staff)
            .await
            .unwrap();
        let code = h
            .engine
            .create_code(bundle.id, crate::CodeSpec::default(), &staff)
            .await
            .unwrap();
        h.engine
            .redeem_code(&code.code, "a@x.com", &ClientContext::default())
            .await
            .unwrap();

        let request = submit(&h, "a@x.com", vec![h.gated[0], h.gated[1]]).await;
        let approval = h
            .engine
            .approve_gated(request.id, approve_for(Some(30)), &h.reviewer())
            .await
            .unwrap();
        let identity = Identity::new("a@x.com", approval.token.token).unwrap();

        h.clock.advance(Duration::days(31));
        assert!(h.engine.verify_token(&identity).await.unwrap().valid);
        assert!(h.engine.has_access(&identity, h.gated[0]).await.unwrap());
        assert!(!h.engine.has_access(&identity, h.gated[1]).await.unwrap());

        let email = Email::parse("a@x.com").unwrap();
        let grants = h.engine.store().grants_for(&email).await.unwrap();
        let bundled = grants.iter().find(|g| g.item == h.gated[0]).unwrap();
        assert_eq!(bundled.source, GrantSource::Bundle);
        assert_eq!(bundled.expires_at, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_approvals_create_one_set_of_grants() {
        let h = Harness::new();
        let request = submit(&h, "a@x.com", vec![h.gated[0], h.gated[1]]).await;

        let mut handles = Vec::new();
        for days in [Some(7), Some(30)] {
            let engine = Arc::clone(&h.engine);
            let reviewer = h.reviewer();
            handles.push(tokio::spawn(async move {
                engine.approve_gated(request.id, approve_for(days), &reviewer).await
            }));
        }

        let mut winners = Vec::new();
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(approval) => winners.push(approval),
                Err(e) if e.is_conflict() => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(conflicts, 1);

        let email = Email::parse("a@x.com").unwrap();
        let grants = h.engine.store().grants_for(&email).await.unwrap();
        assert_eq!(grants.len(), 2);
        let winning_expiry = winners[0].grants[0].expires_at;
        assert!(grants.iter().all(|g| g.expires_at == winning_expiry));
        assert_eq!(h.notifier.sent().iter().filter(|n| n.kind() == "trust_approved").count(), 1);
    }
}
