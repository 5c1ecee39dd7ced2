//! Entitlement reads: one snapshot per identity, evaluated in memory.

use trustgate_access::{has_access, EntitlementSnapshot, ItemAccess};
use trustgate_auth::Identity;
use trustgate_core::{CatalogItem, DomainError, Email, ItemRef};

use trustgate_infra::{AccessStore, Catalog};

use crate::{AccessEngine, AccessResult};

impl AccessEngine {
    /// Every source of access for `email`, read once.
    pub async fn snapshot_for(&self, email: &Email) -> AccessResult<EntitlementSnapshot> {
        let portal = self.store.simple_requests_for(email).await?;
        let grants = self.store.grants_for(email).await?;
        Ok(EntitlementSnapshot::from_sources(email.clone(), &portal, &grants))
    }

    /// `hasAccess` for a portal caller.
    ///
    /// Public items are always visible. For gated items an invalid identity
    /// (unknown, expired or revoked token) simply has no access.
    pub async fn has_access(&self, identity: &Identity, item: ItemRef) -> AccessResult<bool> {
        let entry = self.catalog_entry(item).await?;
        if !entry.gated {
            return Ok(true);
        }
        if self.live_token(identity).await?.is_none() {
            return Ok(false);
        }
        let snapshot = self.snapshot_for(&identity.email).await?;
        Ok(has_access(&snapshot, &entry, self.now()))
    }

    /// The whole catalog annotated with this caller's access.
    pub async fn accessible_items(&self, identity: &Identity) -> AccessResult<Vec<ItemAccess>> {
        self.authenticate(identity).await?;
        let catalog = self.catalog.list_gated_status().await?;
        let snapshot = self.snapshot_for(&identity.email).await?;
        Ok(snapshot.resolve(&catalog, self.now()))
    }

    /// Download check: `Ok` with the catalog entry when the caller may fetch it.
    ///
    /// Anonymous callers may fetch public items only.
    pub async fn authorize_item(
        &self,
        identity: Option<&Identity>,
        item: ItemRef,
    ) -> AccessResult<CatalogItem> {
        let entry = self.catalog_entry(item).await?;
        if !entry.gated {
            return Ok(entry);
        }
        let identity = identity.ok_or(DomainError::Unauthorized)?;
        self.authenticate(identity).await?;
        let snapshot = self.snapshot_for(&identity.email).await?;
        if has_access(&snapshot, &entry, self.now()) {
            Ok(entry)
        } else {
            Err(DomainError::forbidden(format!("no active grant for {item}")).into())
        }
    }

    pub(crate) async fn catalog_entry(&self, item: ItemRef) -> AccessResult<CatalogItem> {
        self.catalog
            .find_item(item)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("item {item}")).into())
    }
}
