//! Staff-managed per-item grants outside the request workflows.

use std::collections::BTreeSet;

use tracing::instrument;

use trustgate_access::grant::expiry_after_days;
use trustgate_access::{GatedAccessGrant, GrantSource};
use trustgate_auth::{Permission, StaffPrincipal};
use trustgate_core::{DomainError, Email, ItemRef};
use trustgate_infra::{AccessStore, Catalog};

use crate::{AccessEngine, AccessResult};

impl AccessEngine {
    /// Create `direct` grants for `email` on each item. An existing grant is
    /// replaced only when the new one lasts longer; use [`Self::revoke_grant`]
    /// to shorten access.
    #[instrument(skip(self, email, items, principal), fields(count = items.len(), staff_id = %principal.staff_id), err)]
    pub async fn grant_direct(
        &self,
        email: &str,
        items: Vec<ItemRef>,
        expiry_days: Option<u32>,
        principal: &StaffPrincipal,
    ) -> AccessResult<Vec<GatedAccessGrant>> {
        self.require(principal, &Permission::MANAGE_GRANTS)?;
        let email = Email::parse(email)?;
        let mut seen = BTreeSet::new();
        let items: Vec<ItemRef> = items.into_iter().filter(|i| seen.insert(*i)).collect();
        if items.is_empty() {
            return Err(DomainError::validation("at least one item is required").into());
        }

        let catalog = self.catalog.list_gated_status().await?;
        if let Some(unknown) = items
            .iter()
            .find(|item| !catalog.iter().any(|c| c.item_ref() == **item))
        {
            return Err(DomainError::not_found(format!("item {unknown}")).into());
        }

        let now = self.now();
        let expires_at = expiry_after_days(now, expiry_days)?;
        let grants: Vec<GatedAccessGrant> = items
            .into_iter()
            .map(|item| {
                GatedAccessGrant::new(
                    email.clone(),
                    item,
                    expires_at,
                    Some(principal.staff_id),
                    GrantSource::Direct,
                    now,
                )
            })
            .collect();

        let mut uow = self.store.begin().await?;
        for grant in &grants {
            uow.merge_grant(grant).await?;
        }
        uow.commit().await?;
        tracing::info!(grants = grants.len(), "direct grants written");

        Ok(grants)
    }

    #[instrument(skip(self, email, principal), fields(item = %item, staff_id = %principal.staff_id), err)]
    pub async fn revoke_grant(
        &self,
        email: &str,
        item: ItemRef,
        principal: &StaffPrincipal,
    ) -> AccessResult<()> {
        self.require(principal, &Permission::MANAGE_GRANTS)?;
        let email = Email::parse(email)?;
        if self.store.delete_grant(&email, item).await?.is_none() {
            return Err(DomainError::not_found(format!("grant for {item}")).into());
        }
        tracing::info!("grant revoked");
        Ok(())
    }

    pub async fn list_grants(
        &self,
        email: &str,
        principal: &StaffPrincipal,
    ) -> AccessResult<Vec<GatedAccessGrant>> {
        self.require(principal, &Permission::MANAGE_GRANTS)?;
        let email = Email::parse(email)?;
        Ok(self.store.grants_for(&email).await?)
    }
}
