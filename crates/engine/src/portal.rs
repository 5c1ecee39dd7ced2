//! Resources Portal workflow.
//!
//! ```text
//! pending ──approve──▶ approved ──revoke──▶ rejected
//!    └─────reject─────────────────────────▶ rejected
//! ```
//!
//! Revoke lands in the same `rejected` status as a rejection; only the
//! notification differs.

use serde::Serialize;
use tracing::instrument;

use trustgate_access::portal::validate_grants;
use trustgate_access::{PortalGrants, SimpleAccessRequest};
use trustgate_auth::{AccessToken, Permission, StaffPrincipal, TokenOrigin};
use trustgate_core::{DomainError, Email, RequestId, RequestStatus};
use trustgate_infra::{AccessStore, Review, TransitionTarget};
use trustgate_notify::Notification;

use crate::{AccessEngine, AccessResult, ClientContext, ReviewOutcome};

pub const RATE_PORTAL_SUBMIT: &str = "portal_submit";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimpleSubmission {
    pub request: SimpleAccessRequest,
    /// False when an open request for the email already existed and was returned.
    pub created: bool,
    pub notified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleApproval {
    pub request: SimpleAccessRequest,
    pub token: AccessToken,
    pub notified: bool,
}

impl AccessEngine {
    #[instrument(skip(self, name, company, client), err)]
    pub async fn submit_simple_request(
        &self,
        email: &str,
        name: Option<String>,
        company: Option<String>,
        client: &ClientContext,
    ) -> AccessResult<SimpleSubmission> {
        self.throttle(
            RATE_PORTAL_SUBMIT,
            client.rate_identity(),
            &self.config.rate_limits.portal_submit,
        )
        .await?;

        let email = Email::parse(email)?;
        let request = SimpleAccessRequest::submit(email, name, company, self.now())?;

        let mut uow = self.store.begin().await?;
        if !uow.insert_simple_request(&request).await? {
            drop(uow);
            let existing = self
                .store
                .simple_requests_for(&request.email)
                .await?
                .into_iter()
                .find(SimpleAccessRequest::is_open)
                .ok_or_else(|| DomainError::conflict("request changed concurrently; retry"))?;
            tracing::info!(request_id = %existing.id, "open portal request already exists");
            return Ok(SimpleSubmission {
                request: existing,
                created: false,
                notified: false,
            });
        }
        uow.commit().await?;
        tracing::info!(request_id = %request.id, "portal request submitted");

        let notified = self
            .deliver(Notification::PortalRequestSubmitted {
                request_id: request.id,
                email: request.email.clone(),
                name: request.name.clone(),
                company: request.company.clone(),
            })
            .await;

        Ok(SimpleSubmission {
            request,
            created: true,
            notified,
        })
    }

    /// `pending -> approved`, record grants, issue a long-lived token.
    #[instrument(skip(self, grants, principal), fields(request_id = %id, staff_id = %principal.staff_id), err)]
    pub async fn approve_simple(
        &self,
        id: RequestId,
        grants: PortalGrants,
        principal: &StaffPrincipal,
    ) -> AccessResult<SimpleApproval> {
        self.require(principal, &Permission::REVIEW_REQUESTS)?;
        validate_grants(&grants)?;
        let mut request = self.simple_request(id).await?;
        let review = Review::new(self.now(), principal.staff_id);

        let mut uow = self.store.begin().await?;
        uow.compare_and_transition(
            TransitionTarget::Simple(id),
            RequestStatus::Pending,
            RequestStatus::Approved,
            &review,
        )
        .await?
        .require("request already reviewed")?;
        uow.update_simple_grants(id, &grants)
            .await?
            .require("request already reviewed")?;
        let token = self
            .stage_token(
                uow.as_mut(),
                &request.email,
                TokenOrigin::Portal(id),
                self.config.portal_token_ttl(),
            )
            .await?;
        uow.commit().await?;
        tracing::info!(full_access = grants.full_access, items = grants.items.len(), "portal request approved");

        request.status = RequestStatus::Approved;
        request.grants = grants;
        request.reviewed_at = Some(review.reviewed_at);
        request.reviewed_by = Some(review.reviewed_by);

        let notified = self
            .deliver(Notification::PortalApproved {
                request_id: id,
                email: request.email.clone(),
                token: token.token.clone(),
                full_access: request.grants.full_access,
                expires_at: token.expires_at,
            })
            .await;

        Ok(SimpleApproval {
            request,
            token,
            notified,
        })
    }

    /// Replace the grant set of an approved request. Tokens are untouched.
    #[instrument(skip(self, grants, principal), fields(request_id = %id, staff_id = %principal.staff_id), err)]
    pub async fn update_simple_grants(
        &self,
        id: RequestId,
        grants: PortalGrants,
        principal: &StaffPrincipal,
    ) -> AccessResult<SimpleAccessRequest> {
        self.require(principal, &Permission::REVIEW_REQUESTS)?;
        validate_grants(&grants)?;
        let mut request = self.simple_request(id).await?;

        let mut uow = self.store.begin().await?;
        uow.update_simple_grants(id, &grants)
            .await?
            .require("only approved requests can have their grants updated")?;
        uow.commit().await?;

        request.grants = grants;
        Ok(request)
    }

    #[instrument(skip(self, principal), fields(request_id = %id, staff_id = %principal.staff_id), err)]
    pub async fn reject_simple(
        &self,
        id: RequestId,
        principal: &StaffPrincipal,
    ) -> AccessResult<ReviewOutcome<RequestId>> {
        self.review_simple(id, principal, RequestStatus::Pending, "request already reviewed")
            .await
    }

    /// `approved -> rejected`. Every token issued for the request stops
    /// verifying on commit.
    #[instrument(skip(self, principal), fields(request_id = %id, staff_id = %principal.staff_id), err)]
    pub async fn revoke_simple(
        &self,
        id: RequestId,
        principal: &StaffPrincipal,
    ) -> AccessResult<ReviewOutcome<RequestId>> {
        self.review_simple(
            id,
            principal,
            RequestStatus::Approved,
            "only approved requests can be revoked",
        )
        .await
    }

    pub async fn list_simple_requests(
        &self,
        status: Option<RequestStatus>,
        principal: &StaffPrincipal,
    ) -> AccessResult<Vec<SimpleAccessRequest>> {
        self.require(principal, &Permission::REVIEW_REQUESTS)?;
        Ok(self.store.list_simple_requests(status).await?)
    }

    async fn review_simple(
        &self,
        id: RequestId,
        principal: &StaffPrincipal,
        from: RequestStatus,
        conflict: &str,
    ) -> AccessResult<ReviewOutcome<RequestId>> {
        self.require(principal, &Permission::REVIEW_REQUESTS)?;
        let request = self.simple_request(id).await?;
        let review = Review::new(self.now(), principal.staff_id);

        let mut uow = self.store.begin().await?;
        uow.compare_and_transition(
            TransitionTarget::Simple(id),
            from,
            RequestStatus::Rejected,
            &review,
        )
        .await?
        .require(conflict)?;
        uow.commit().await?;

        let notification = match from {
            RequestStatus::Approved => Notification::PortalRevoked {
                request_id: id,
                email: request.email,
            },
            _ => Notification::PortalRejected {
                request_id: id,
                email: request.email,
            },
        };
        tracing::info!(kind = notification.kind(), "portal request closed");
        let notified = self.deliver(notification).await;

        Ok(ReviewOutcome {
            request_id: id,
            status: RequestStatus::Rejected,
            notified,
        })
    }

    async fn simple_request(&self, id: RequestId) -> AccessResult<SimpleAccessRequest> {
        self.store
            .find_simple_request(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("request {id}")).into())
    }
}
