//! Bundles, redemption codes and redemption.
//!
//! Capacity is enforced by the store's conditional increment. A repeat
//! redemption by the same email counts nothing and creates no grants, but
//! still mails a fresh token to the redeemer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use trustgate_access::bundle::normalize_code;
use trustgate_access::{Bundle, GatedAccessGrant, GrantSource, Redemption, RedemptionCode};
use trustgate_auth::{Permission, StaffPrincipal, TokenOrigin};
use trustgate_core::{BundleId, CodeId, DomainError, Email, ItemRef};
use trustgate_infra::{AccessStore, Catalog};
use trustgate_notify::Notification;

use crate::{AccessEngine, AccessResult, ClientContext};

pub const RATE_REDEEM: &str = "redeem";

/// Staff input for a new code. A missing `code` is generated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSpec {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_redemptions: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redeemed {
    pub code_id: CodeId,
    pub bundle_id: BundleId,
    pub granted_items: Vec<ItemRef>,
    /// Items whose grant this redemption created or extended; empty on a repeat.
    pub newly_granted: Vec<ItemRef>,
    pub first_redemption: bool,
    /// Expiry of the token mailed to the redeemer.
    pub token_expires_at: DateTime<Utc>,
    pub notified: bool,
}

impl AccessEngine {
    #[instrument(skip(self, name, items, principal), fields(staff_id = %principal.staff_id), err)]
    pub async fn create_bundle(
        &self,
        name: &str,
        items: Vec<ItemRef>,
        principal: &StaffPrincipal,
    ) -> AccessResult<Bundle> {
        self.require(principal, &Permission::MANAGE_BUNDLES)?;
        let bundle = Bundle::new(name, items, self.now())?;
        for item in &bundle.items {
            self.catalog_entry(*item).await?;
        }
        self.store.insert_bundle(&bundle).await?;
        tracing::info!(bundle_id = %bundle.id, items = bundle.items.len(), "bundle created");
        Ok(bundle)
    }

    pub async fn list_bundles(&self, principal: &StaffPrincipal) -> AccessResult<Vec<Bundle>> {
        self.require(principal, &Permission::MANAGE_BUNDLES)?;
        Ok(self.store.list_bundles().await?)
    }

    #[instrument(skip(self, spec, principal), fields(bundle_id = %bundle_id, staff_id = %principal.staff_id), err)]
    pub async fn create_code(
        &self,
        bundle_id: BundleId,
        spec: CodeSpec,
        principal: &StaffPrincipal,
    ) -> AccessResult<RedemptionCode> {
        self.require(principal, &Permission::MANAGE_BUNDLES)?;
        if self.store.find_bundle(bundle_id).await?.is_none() {
            return Err(DomainError::not_found(format!("bundle {bundle_id}")).into());
        }
        let code = RedemptionCode::new(
            bundle_id,
            spec.code.as_deref(),
            spec.expires_at,
            spec.max_redemptions,
            self.now(),
        )?;
        self.store.insert_code(&code).await?;
        tracing::info!(code_id = %code.id, "redemption code created");
        Ok(code)
    }

    pub async fn list_codes(
        &self,
        bundle_id: BundleId,
        principal: &StaffPrincipal,
    ) -> AccessResult<Vec<RedemptionCode>> {
        self.require(principal, &Permission::MANAGE_BUNDLES)?;
        Ok(self.store.list_codes(bundle_id).await?)
    }

    pub async fn list_redemptions(
        &self,
        code_id: CodeId,
        principal: &StaffPrincipal,
    ) -> AccessResult<Vec<Redemption>> {
        self.require(principal, &Permission::MANAGE_BUNDLES)?;
        Ok(self.store.redemptions_for(code_id).await?)
    }

    /// Grants already created by the code stay in place.
    #[instrument(skip(self, principal), fields(code_id = %code_id, staff_id = %principal.staff_id), err)]
    pub async fn delete_code(&self, code_id: CodeId, principal: &StaffPrincipal) -> AccessResult<()> {
        self.require(principal, &Permission::MANAGE_BUNDLES)?;
        if self.store.delete_code(code_id).await?.is_none() {
            return Err(DomainError::not_found(format!("code {code_id}")).into());
        }
        tracing::info!("redemption code deleted");
        Ok(())
    }

    #[instrument(skip(self, code, email, _client), err)]
    pub async fn redeem_code(
        &self,
        code: &str,
        email: &str,
        _client: &ClientContext,
    ) -> AccessResult<Redeemed> {
        let email = Email::parse(email)?;
        self.throttle(RATE_REDEEM, email.as_str(), &self.config.rate_limits.redeem)
            .await?;

        // A malformed code cannot exist; report it like any unknown code.
        let value = normalize_code(code).map_err(|_| DomainError::not_found("redemption code"))?;
        let code = self
            .store
            .find_code_by_value(&value)
            .await?
            .ok_or_else(|| DomainError::not_found("redemption code"))?;
        let now = self.now();
        code.check_not_expired(now)?;
        let bundle = self
            .store
            .find_bundle(code.bundle_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("bundle {}", code.bundle_id)))?;

        let mut uow = self.store.begin().await?;
        let redemption = Redemption {
            code_id: code.id,
            email: email.clone(),
            redeemed_at: now,
        };
        let first_redemption = uow.insert_redemption_if_absent(&redemption).await?;
        if first_redemption {
            uow.increment_redemptions(code.id)
                .await?
                .require("max redemptions reached")?;
        }
        let mut newly_granted = Vec::new();
        for item in &bundle.items {
            let grant = GatedAccessGrant::new(email.clone(), *item, None, None, GrantSource::Bundle, now);
            if uow.merge_grant(&grant).await? {
                newly_granted.push(*item);
            }
        }
        let token = self
            .stage_token(
                uow.as_mut(),
                &email,
                TokenOrigin::Redemption(code.id),
                self.config.redemption_token_ttl(),
            )
            .await?;
        uow.commit().await?;
        tracing::info!(
            code_id = %code.id,
            first_redemption,
            new_grants = newly_granted.len(),
            "code redeemed"
        );

        let notified = self
            .deliver(Notification::BundleRedeemed {
                code_id: code.id,
                bundle_id: bundle.id,
                email,
                token: token.token,
                token_expires_at: token.expires_at,
                item_count: bundle.items.len(),
            })
            .await;

        Ok(Redeemed {
            code_id: code.id,
            bundle_id: bundle.id,
            granted_items: bundle.items,
            newly_granted,
            first_redemption,
            token_expires_at: token.expires_at,
            notified,
        })
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

    async fn bundle_with_code(h: &Harness, spec: CodeSpec) -> (Bundle, RedemptionCode) {
        let staff = h.admin();
        let bundle = h
            .engine
            .create_bundle("Launch kit", h.gated.clone(), &staff)
            .await
            .unwrap();
        let code = h.engine.create_code(bundle.id, spec, &staff).await.unwrap();
        (bundle, code)
    }

    fn capped(max: u32) -> CodeSpec {
        CodeSpec {
            max_redemptions: Some(max),
            ..CodeSpec::default()
        }
    }

    #[tokio::test]
    async fn redeeming_grants_every_bundle_item_without_expiry() {
        let h = Harness::new();
        let (bundle, code) = bundle_with_code(&h, capped(5)).await;

        let out = h
            .engine
            .redeem_code(&code.code.to_lowercase(), "a@x.com", &ClientContext::default())
            .await
            .unwrap();
        assert!(out.first_redemption);
        assert_eq!(out.bundle_id, bundle.id);
        assert_eq!(out.newly_granted, bundle.items);

        let email = Email::parse("a@x.com").unwrap();
        let grants = h.engine.store().grants_for(&email).await.unwrap();
        assert_eq!(grants.len(), 2);
        assert!(grants.iter().all(|g| g.source == GrantSource::Bundle && g.expires_at.is_none()));
        let stored = h.engine.store().find_code(code.id).await.unwrap().unwrap();
        assert_eq!(stored.redeemed_count, 1);
    }

    #[tokio::test]
    async fn repeat_redemption_is_idempotent() {
        let h = Harness::new();
        let (_, code) = bundle_with_code(&h, capped(1)).await;
        let client = ClientContext::default();

        h.engine.redeem_code(&code.code, "a@x.com", &client).await.unwrap();
        let again = h.engine.redeem_code(&code.code, "A@x.com", &client).await.unwrap();
        assert!(!again.first_redemption);
        assert!(again.newly_granted.is_empty());

        let stored = h.engine.store().find_code(code.id).await.unwrap().unwrap();
        assert_eq!(stored.redeemed_count, 1);
        let redemptions = h.engine.list_redemptions(code.id, &h.admin()).await.unwrap();
        assert_eq!(redemptions.len(), 1);
    }

    #[tokio::test]
    async fn redemption_extends_shorter_grants_and_keeps_permanent_ones() {
        let h = Harness::new();
        h.engine
            .grant_direct("a@x.com", vec![h.gated[0]], Some(3), &h.admin())
            .await
            .unwrap();
        h.engine
            .grant_direct("a@x.com", vec![h.gated[1]], None, &h.admin())
            .await
            .unwrap();
        let (_, code) = bundle_with_code(&h, CodeSpec::default()).await;

        let out = h
            .engine
            .redeem_code(&code.code, "a@x.com", &ClientContext::default())
            .await
            .unwrap();
        assert_eq!(out.newly_granted, vec![h.gated[0]]);

        let email = Email::parse("a@x.com").unwrap();
        let grants = h.engine.store().grants_for(&email).await.unwrap();
        let extended = grants.iter().find(|g| g.item == h.gated[0]).unwrap();
        assert_eq!(extended.source, GrantSource::Bundle);
        assert_eq!(extended.expires_at, None);
        let kept = grants.iter().find(|g| g.item == h.gated[1]).unwrap();
        assert_eq!(kept.source, GrantSource::Direct);
    }

    #[tokio::test]
    async fn redeemer_receives_a_token_that_unlocks_the_bundle() {
        let h = Harness::new();
        let (bundle, code) = bundle_with_code(&h, capped(3)).await;

        let out = h
            .engine
            .redeem_code(&code.code, "b@x.com", &ClientContext::default())
            .await
            .unwrap();
        assert!(out.notified);
        assert_eq!(out.token_expires_at, h.clock.now() + Duration::days(90));

        let sent = h.notifier.last_of("bundle_redeemed").unwrap();
        let token = sent.token().unwrap().to_string();
        let identity = Identity::new("b@x.com", token.clone()).unwrap();
        assert!(h.engine.verify_token(&identity).await.unwrap().valid);
        for item in &bundle.items {
            assert!(h.engine.has_access(&identity, *item).await.unwrap());
        }
        let listing = h.engine.accessible_items(&identity).await.unwrap();
        assert!(listing.iter().all(|entry| entry.has_access));

        let stranger = Identity::new("eve@x.com", token).unwrap();
        assert!(!h.engine.verify_token(&stranger).await.unwrap().valid);

        // Revoking the grant still cuts access; the token alone unlocks nothing.
        h.engine
            .revoke_grant("b@x.com", bundle.items[0], &h.admin())
            .await
            .unwrap();
        assert!(!h.engine.has_access(&identity, bundle.items[0]).await.unwrap());
    }

    #[tokio::test]
    async fn full_code_rejects_new_emails_without_writing() {
        let h = Harness::new();
        let (_, code) = bundle_with_code(&h, capped(1)).await;
        let client = ClientContext::default();
        h.engine.redeem_code(&code.code, "a@x.com", &client).await.unwrap();

        let err = h.engine.redeem_code(&code.code, "b@x.com", &client).await.unwrap_err();
        assert!(err.is_conflict());
        let email = Email::parse("b@x.com").unwrap();
        assert!(h.engine.store().grants_for(&email).await.unwrap().is_empty());
        assert_eq!(h.engine.list_redemptions(code.id, &h.admin()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_malformed_and_expired_codes() {
        let h = Harness::new();
        let client = ClientContext::default();
        let err = h.engine.redeem_code("NOPE-NOPE", "a@x.com", &client).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
        let err = h.engine.redeem_code("!!", "a@x.com", &client).await.unwrap_err();
        assert_eq!(err.code(), "not_found");

        let spec = CodeSpec {
            code: Some("spring-26".into()),
            expires_at: Some(h.clock.now() + Duration::hours(1)),
            max_redemptions: None,
        };
        let (_, code) = bundle_with_code(&h, spec).await;
        assert_eq!(code.code, "SPRING-26");
        h.clock.advance(Duration::hours(2));
        let err = h.engine.redeem_code("spring-26", "a@x.com", &client).await.unwrap_err();
        assert_eq!(err.code(), "expired");
    }

    #[tokio::test]
    async fn codes_are_unique_and_bound_to_a_bundle() {
        let h = Harness::new();
        let staff = h.admin();
        let spec = CodeSpec {
            code: Some("WELCOME".into()),
            ..CodeSpec::default()
        };
        let (bundle, _) = bundle_with_code(&h, spec.clone()).await;

        let err = h.engine.create_code(bundle.id, spec.clone(), &staff).await.unwrap_err();
        assert!(err.is_conflict());
        let err = h.engine.create_code(BundleId::new(), spec, &staff).await.unwrap_err();
        assert_eq!(err.code(), "not_found");

        let generated = h.engine.create_code(bundle.id, CodeSpec::default(), &staff).await.unwrap();
        assert_eq!(generated.code.len(), trustgate_access::bundle::GENERATED_CODE_LEN);
        assert_eq!(h.engine.list_codes(bundle.id, &staff).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn bundles_need_known_items_and_permission() {
        let h = Harness::new();
        let err = h
            .engine
            .create_bundle("Kit", vec![ItemRef::Resource(ItemId::new())], &h.admin())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
        let err = h
            .engine
            .create_bundle("Kit", h.gated.clone(), &h.reviewer())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "forbidden");
        assert!(h.engine.list_bundles(&h.admin()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleted_code_no_longer_redeems() {
        let h = Harness::new();
        let (_, code) = bundle_with_code(&h, CodeSpec::default()).await;
        h.engine.delete_code(code.id, &h.admin()).await.unwrap();

        let err = h
            .engine
            .redeem_code(&code.code, "a@x.com", &ClientContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
        let err = h.engine.delete_code(code.id, &h.admin()).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn redemption_attempts_are_rate_limited_per_email() {
        let h = Harness::new();
        let client = ClientContext::default();
        for _ in 0..10 {
            let _ = h.engine.redeem_code("GUESS-1234", "guesser@x.com", &client).await;
        }
        let err = h
            .engine
            .redeem_code("GUESS-1234", "guesser@x.com", &client)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "rate_limited");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_redemptions_never_exceed_the_cap() {
        let h = Harness::new();
        let (_, code) = bundle_with_code(&h, capped(2)).await;

        let mut handles = Vec::new();
        for email in ["a@x.com", "b@x.com", "c@x.com"] {
            let engine = Arc::clone(&h.engine);
            let value = code.code.clone();
            handles.push(tokio::spawn(async move {
                engine.redeem_code(&value, email, &ClientContext::default()).await
            }));
        }

        let mut ok = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) if e.is_conflict() => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 2);
        assert_eq!(conflicts, 1);
        let stored = h.engine.store().find_code(code.id).await.unwrap().unwrap();
        assert_eq!(stored.redeemed_count, 2);
    }
}
