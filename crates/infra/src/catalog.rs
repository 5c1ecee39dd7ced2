//! Read-only view of the content catalog.
//!
//! The catalog is owned elsewhere; this crate only needs each item's gated flag
//! and the NDA agreements a Trust Center request may reference.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use trustgate_access::NdaAgreement;
use trustgate_core::{AgreementId, CatalogItem, ItemId, ItemKind, ItemRef};

use crate::store::{StoreError, StoreResult};

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Every catalog item with its current gated flag.
    async fn list_gated_status(&self) -> StoreResult<Vec<CatalogItem>>;

    /// Active agreements only; inactive or unknown ids resolve to `None`.
    async fn find_agreement(&self, id: AgreementId) -> StoreResult<Option<NdaAgreement>>;

    async fn find_item(&self, item: ItemRef) -> StoreResult<Option<CatalogItem>> {
        Ok(self
            .list_gated_status()
            .await?
            .into_iter()
            .find(|c| c.item_ref() == item))
    }
}

#[async_trait]
impl<C> Catalog for Arc<C>
where
    C: Catalog + ?Sized,
{
    async fn list_gated_status(&self) -> StoreResult<Vec<CatalogItem>> {
        (**self).list_gated_status().await
    }

    async fn find_agreement(&self, id: AgreementId) -> StoreResult<Option<NdaAgreement>> {
        (**self).find_agreement(id).await
    }

    async fn find_item(&self, item: ItemRef) -> StoreResult<Option<CatalogItem>> {
        (**self).find_item(item).await
    }
}

/// In-memory catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    items: RwLock<Vec<CatalogItem>>,
    agreements: RwLock<HashMap<AgreementId, NdaAgreement>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(self, kind: ItemKind, gated: bool) -> (Self, ItemRef) {
        let item = CatalogItem {
            id: ItemId::new(),
            kind,
            gated,
        };
        let item_ref = item.item_ref();
        self.upsert_item(item);
        (self, item_ref)
    }

    pub fn upsert_item(&self, item: CatalogItem) {
        if let Ok(mut items) = self.items.write() {
            match items.iter_mut().find(|c| c.id == item.id && c.kind == item.kind) {
                Some(existing) => *existing = item,
                None => items.push(item),
            }
        }
    }

    /// Flip an item's gated flag. Returns false when the item is unknown.
    pub fn set_gated(&self, item: ItemRef, gated: bool) -> bool {
        match self.items.write() {
            Ok(mut items) => match items.iter_mut().find(|c| c.item_ref() == item) {
                Some(existing) => {
                    existing.gated = gated;
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    pub fn add_agreement(&self, name: &str, version: &str, active: bool) -> AgreementId {
        let agreement = NdaAgreement {
            id: AgreementId::new(),
            name: name.to_string(),
            version: version.to_string(),
            active,
        };
        let id = agreement.id;
        if let Ok(mut agreements) = self.agreements.write() {
            agreements.insert(id, agreement);
        }
        id
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn list_gated_status(&self) -> StoreResult<Vec<CatalogItem>> {
        self.items
            .read()
            .map(|items| items.clone())
            .map_err(|_| StoreError::Backend("catalog lock poisoned".to_string()))
    }

    async fn find_agreement(&self, id: AgreementId) -> StoreResult<Option<NdaAgreement>> {
        let agreements = self
            .agreements
            .read()
            .map_err(|_| StoreError::Backend("catalog lock poisoned".to_string()))?;
        Ok(agreements.get(&id).filter(|a| a.active).cloned())
    }
}

/// Reads `catalog_items` / `nda_agreements`.
#[derive(Debug, Clone)]
pub struct PostgresCatalog {
    pool: Arc<PgPool>,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn catalog_error(operation: &str, err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("sqlx error in {operation}: {err}"))
}

#[async_trait]
impl Catalog for PostgresCatalog {
    async fn list_gated_status(&self) -> StoreResult<Vec<CatalogItem>> {
        let rows = sqlx::query("SELECT id, kind, gated FROM catalog_items")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| catalog_error("list_gated_status", e))?;

        rows.iter()
            .map(|row| {
                let id: Uuid = row.try_get("id").map_err(|e| catalog_error("list_gated_status", e))?;
                let kind: String = row.try_get("kind").map_err(|e| catalog_error("list_gated_status", e))?;
                let gated: bool = row.try_get("gated").map_err(|e| catalog_error("list_gated_status", e))?;
                Ok(CatalogItem {
                    id: ItemId::from_uuid(id),
                    kind: kind
                        .parse()
                        .map_err(|e| StoreError::Corrupt(format!("catalog kind: {e}")))?,
                    gated,
                })
            })
            .collect()
    }

    async fn find_agreement(&self, id: AgreementId) -> StoreResult<Option<NdaAgreement>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, version, active
            FROM nda_agreements
            WHERE id = $1 AND active
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| catalog_error("find_agreement", e))?;

        row.map(|row| {
            Ok(NdaAgreement {
                id: AgreementId::from_uuid(row.try_get("id").map_err(|e| catalog_error("find_agreement", e))?),
                name: row.try_get("name").map_err(|e| catalog_error("find_agreement", e))?,
                version: row.try_get("version").map_err(|e| catalog_error("find_agreement", e))?,
                active: row.try_get("active").map_err(|e| catalog_error("find_agreement", e))?,
            })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inactive_agreements_do_not_resolve() {
        let catalog = InMemoryCatalog::new();
        let active = catalog.add_agreement("Mutual NDA", "v3", true);
        let retired = catalog.add_agreement("Mutual NDA", "v2", false);

        assert!(catalog.find_agreement(active).await.unwrap().is_some());
        assert!(catalog.find_agreement(retired).await.unwrap().is_none());
        assert!(catalog.find_agreement(AgreementId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn gated_flag_is_read_live() {
        let (catalog, item) = InMemoryCatalog::new().with_item(ItemKind::Resource, false);
        assert!(!catalog.find_item(item).await.unwrap().unwrap().gated);

        assert!(catalog.set_gated(item, true));
        assert!(catalog.find_item(item).await.unwrap().unwrap().gated);
        assert!(!catalog.set_gated(ItemRef::Article(ItemId::new()), true));
    }
}
