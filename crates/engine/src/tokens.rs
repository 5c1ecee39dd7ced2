//! Token issuance and verification.
//!
//! A token is valid only while its originating request is still approved, so
//! revoking the request invalidates every token it produced without touching
//! the token rows.

use chrono::Duration;
use tracing::instrument;

use trustgate_auth::{check_token, AccessToken, Identity, TokenOrigin, TokenVerification};
use trustgate_core::{DomainError, Email, RequestStatus};
use trustgate_infra::{AccessStore, UnitOfWork};

use crate::{AccessEngine, AccessResult};

impl AccessEngine {
    /// Issue and persist a token in its own unit of work.
    #[instrument(skip(self, email), fields(origin = ?origin), err)]
    pub async fn issue_token(
        &self,
        email: &Email,
        origin: TokenOrigin,
        ttl: Duration,
    ) -> AccessResult<AccessToken> {
        let mut uow = self.store.begin().await?;
        let token = self.stage_token(uow.as_mut(), email, origin, ttl).await?;
        uow.commit().await?;
        Ok(token)
    }

    /// Verify a portal identity. Read-only.
    pub async fn verify_token(&self, identity: &Identity) -> AccessResult<TokenVerification> {
        Ok(match self.live_token(identity).await? {
            Some(token) => TokenVerification::valid(token.expires_at),
            None => TokenVerification::invalid(),
        })
    }

    /// Like [`Self::verify_token`] but an invalid identity is an error.
    pub async fn authenticate(&self, identity: &Identity) -> AccessResult<AccessToken> {
        self.live_token(identity)
            .await?
            .ok_or_else(|| DomainError::Unauthorized.into())
    }

    pub(crate) async fn stage_token(
        &self,
        uow: &mut dyn UnitOfWork,
        email: &Email,
        origin: TokenOrigin,
        ttl: Duration,
    ) -> AccessResult<AccessToken> {
        let token = AccessToken::issue(email.clone(), origin, self.now(), ttl);
        uow.insert_token(&token).await?;
        Ok(token)
    }

    pub(crate) async fn live_token(&self, identity: &Identity) -> AccessResult<Option<AccessToken>> {
        let Some(token) = self.store.find_token(&identity.token).await? else {
            return Ok(None);
        };
        if let Err(reason) = check_token(&token, &identity.email, self.now()) {
            tracing::debug!(%reason, "token rejected");
            return Ok(None);
        }
        if !self.origin_is_approved(token.origin).await? {
            tracing::debug!(origin = ?token.origin, "token origin no longer approved");
            return Ok(None);
        }
        Ok(Some(token))
    }

    async fn origin_is_approved(&self, origin: TokenOrigin) -> AccessResult<bool> {
        let status = match origin {
            TokenOrigin::Portal(id) => self.store.find_simple_request(id).await?.map(|r| r.status),
            TokenOrigin::TrustCenter(id) => self.store.find_gated_request(id).await?.map(|r| r.status),
            TokenOrigin::Redemption(_) => return Ok(true),
        };
        Ok(status == Some(RequestStatus::Approved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustgate_access::PortalGrants;
    use trustgate_core::RequestId;

    use crate::testing::Harness;
    use crate::ClientContext;

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let h = Harness::new();
        let identity = Identity::new("a@x.com", "deadbeef").unwrap();
        let v = h.engine.verify_token(&identity).await.unwrap();
        assert!(!v.valid);
        assert!(v.expires_at.is_none());
    }

    #[tokio::test]
    async fn token_for_unapproved_origin_is_invalid() {
        let h = Harness::new();
        let email = Email::parse("a@x.com").unwrap();
        let token = h
            .engine
            .issue_token(&email, TokenOrigin::Portal(RequestId::new()), Duration::days(1))
            .await
            .unwrap();
        let identity = Identity::new("a@x.com", token.token).unwrap();
        assert!(!h.engine.verify_token(&identity).await.unwrap().valid);
    }

    #[tokio::test]
    async fn email_binding_is_case_insensitive_but_exact() {
        let h = Harness::new();
        let submitted = h
            .engine
            .submit_simple_request("Ada@X.com", None, None, &ClientContext::default())
            .await
            .unwrap();
        let approval = h
            .engine
            .approve_simple(submitted.request.id, PortalGrants::full(), &h.reviewer())
            .await
            .unwrap();

        let same = Identity::new("ADA@x.COM", approval.token.token.clone()).unwrap();
        let other = Identity::new("eve@x.com", approval.token.token.clone()).unwrap();
        assert!(h.engine.verify_token(&same).await.unwrap().valid);
        assert!(!h.engine.verify_token(&other).await.unwrap().valid);
        assert!(h.engine.authenticate(&other).await.is_err());
    }

    #[tokio::test]
    async fn token_expires_at_its_deadline() {
        let h = Harness::new();
        let submitted = h
            .engine
            .submit_simple_request("a@x.com", None, None, &ClientContext::default())
            .await
            .unwrap();
        let approval = h
            .engine
            .approve_simple(submitted.request.id, PortalGrants::full(), &h.reviewer())
            .await
            .unwrap();
        let identity = Identity::new("a@x.com", approval.token.token.clone()).unwrap();

        h.clock.set(approval.token.expires_at - Duration::seconds(1));
        assert!(h.engine.verify_token(&identity).await.unwrap().valid);
        h.clock.set(approval.token.expires_at);
        assert!(!h.engine.verify_token(&identity).await.unwrap().valid);
    }
}
