//! Entitlement resolution.
//!
//! Every grant mechanism is normalized into one list of [`Entitlement`]s read
//! in a single snapshot per identity. Resolution over that snapshot is pure and
//! deterministic, so the same call serves page rendering and download checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use trustgate_core::{CatalogItem, Email, ItemRef};

use crate::grant::{GatedAccessGrant, GrantSource};
use crate::portal::SimpleAccessRequest;

/// What an entitlement covers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "item", rename_all = "snake_case")]
pub enum EntitlementScope {
    /// Every gated item (portal full access).
    All,
    Item(ItemRef),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub scope: EntitlementScope,
    pub expires_at: Option<DateTime<Utc>>,
    pub source: GrantSource,
}

impl Entitlement {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    fn covers(&self, item: ItemRef, now: DateTime<Utc>) -> bool {
        let in_scope = match self.scope {
            EntitlementScope::All => true,
            EntitlementScope::Item(granted) => granted == item,
        };
        in_scope && self.is_live(now)
    }
}

/// All entitlements of one email, read at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementSnapshot {
    pub email: Email,
    pub entitlements: Vec<Entitlement>,
}

/// Per-item decision, as rendered in portal listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAccess {
    pub item: ItemRef,
    pub gated: bool,
    pub has_access: bool,
    /// The mechanism that granted access, if the item is gated and accessible.
    pub source: Option<GrantSource>,
}

impl EntitlementSnapshot {
    pub fn empty(email: Email) -> Self {
        Self {
            email,
            entitlements: Vec::new(),
        }
    }

    /// Fold portal requests and per-item grants into one entitlement list.
    ///
    /// Only approved portal requests for this email contribute; rows belonging
    /// to other emails are ignored.
    pub fn from_sources(
        email: Email,
        portal: &[SimpleAccessRequest],
        grants: &[GatedAccessGrant],
    ) -> Self {
        let mut entitlements = Vec::new();

        for request in portal.iter().filter(|r| r.is_approved() && r.email == email) {
            if request.grants.full_access {
                entitlements.push(Entitlement {
                    scope: EntitlementScope::All,
                    expires_at: None,
                    source: GrantSource::Direct,
                });
            }
            entitlements.extend(request.grants.items.iter().map(|item| Entitlement {
                scope: EntitlementScope::Item(*item),
                expires_at: None,
                source: GrantSource::Direct,
            }));
        }

        entitlements.extend(grants.iter().filter(|g| g.email == email).map(|g| Entitlement {
            scope: EntitlementScope::Item(g.item),
            expires_at: g.expires_at,
            source: g.source,
        }));

        Self {
            email,
            entitlements,
        }
    }

    pub fn has_full_access(&self) -> bool {
        self.entitlements
            .iter()
            .any(|e| e.scope == EntitlementScope::All)
    }

    /// The entitlement that opens `item`, full access first.
    fn granting(&self, item: ItemRef, now: DateTime<Utc>) -> Option<&Entitlement> {
        self.entitlements
            .iter()
            .filter(|e| e.scope == EntitlementScope::All)
            .chain(self.entitlements.iter().filter(|e| e.scope != EntitlementScope::All))
            .find(|e| e.covers(item, now))
    }

    pub fn has_access(&self, item: &CatalogItem, now: DateTime<Utc>) -> bool {
        !item.gated || self.granting(item.item_ref(), now).is_some()
    }

    pub fn resolve(&self, catalog: &[CatalogItem], now: DateTime<Utc>) -> Vec<ItemAccess> {
        catalog
            .iter()
            .map(|item| {
                let source = if item.gated {
                    self.granting(item.item_ref(), now).map(|e| e.source)
                } else {
                    None
                };
                ItemAccess {
                    item: item.item_ref(),
                    gated: item.gated,
                    has_access: !item.gated || source.is_some(),
                    source,
                }
            })
            .collect()
    }
}

/// `hasAccess(email, item, now)` over a pre-read snapshot.
pub fn has_access(snapshot: &EntitlementSnapshot, item: &CatalogItem, now: DateTime<Utc>) -> bool {
    snapshot.has_access(item, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use trustgate_core::{ItemId, ItemKind, RequestStatus};

    use crate::portal::PortalGrants;

    fn email() -> Email {
        Email::parse("a@x.com").unwrap()
    }

    fn gated(kind: ItemKind) -> CatalogItem {
        CatalogItem { id: ItemId::new(), kind, gated: true }
    }

    fn approved_portal(grants: PortalGrants) -> SimpleAccessRequest {
        let mut req = SimpleAccessRequest::submit(email(), None, None, Utc::now()).unwrap();
        req.status = RequestStatus::Approved;
        req.grants = grants;
        req
    }

    fn grant(item: ItemRef, expires_at: Option<DateTime<Utc>>) -> GatedAccessGrant {
        GatedAccessGrant::new(email(), item, expires_at, None, GrantSource::Nda, Utc::now())
    }

    #[test]
    fn full_access_supersedes_item_grants() {
        let doc = gated(ItemKind::Resource);
        let snapshot = EntitlementSnapshot::from_sources(
            email(),
            &[approved_portal(PortalGrants::full())],
            &[grant(doc.item_ref(), Some(Utc::now() - Duration::days(1)))],
        );
        let access = snapshot.resolve(std::slice::from_ref(&doc), Utc::now());
        assert!(access[0].has_access);
        assert_eq!(access[0].source, Some(GrantSource::Direct));
    }

    #[test]
    fn pending_or_rejected_portal_requests_grant_nothing() {
        let doc = gated(ItemKind::Article);
        let mut req = approved_portal(PortalGrants::full());
        req.status = RequestStatus::Rejected;
        let snapshot = EntitlementSnapshot::from_sources(email(), &[req], &[]);
        assert!(!snapshot.has_full_access());
        assert!(!snapshot.has_access(&doc, Utc::now()));
    }

    #[test]
    fn resource_grant_does_not_open_article_with_same_id() {
        let id = ItemId::new();
        let article = CatalogItem { id, kind: ItemKind::Article, gated: true };
        let snapshot = EntitlementSnapshot::from_sources(email(), &[], &[grant(ItemRef::Resource(id), None)]);
        assert!(!snapshot.has_access(&article, Utc::now()));
    }

    #[test]
    fn portal_item_grants_resolve_per_item() {
        let granted = gated(ItemKind::Resource);
        let other = gated(ItemKind::Resource);
        let snapshot = EntitlementSnapshot::from_sources(
            email(),
            &[approved_portal(PortalGrants::items([granted.item_ref()]))],
            &[],
        );
        let now = Utc::now();
        assert!(snapshot.has_access(&granted, now));
        assert!(!snapshot.has_access(&other, now));
    }

    #[test]
    fn rows_for_other_emails_are_ignored() {
        let doc = gated(ItemKind::Resource);
        let mut foreign = grant(doc.item_ref(), None);
        foreign.email = Email::parse("b@x.com").unwrap();
        let snapshot = EntitlementSnapshot::from_sources(email(), &[], &[foreign]);
        assert!(snapshot.entitlements.is_empty());
    }

    fn arb_item() -> impl Strategy<Value = CatalogItem> {
        (any::<u128>(), any::<bool>(), any::<bool>()).prop_map(|(id, article, gated)| CatalogItem {
            id: ItemId::from_uuid(uuid_from(id)),
            kind: if article { ItemKind::Article } else { ItemKind::Resource },
            gated,
        })
    }

    fn uuid_from(bits: u128) -> uuid::Uuid {
        uuid::Uuid::from_u128(bits)
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: non-gated items are visible to everyone.
        #[test]
        fn open_items_always_accessible(item in arb_item(), offset_days in -400i64..400) {
            let item = CatalogItem { gated: false, ..item };
            let snapshot = EntitlementSnapshot::empty(email());
            prop_assert!(snapshot.has_access(&item, Utc::now() + Duration::days(offset_days)));
        }

        /// Property: approved full access opens every gated item.
        #[test]
        fn full_access_opens_every_gated_item(items in prop::collection::vec(arb_item(), 1..20)) {
            let snapshot = EntitlementSnapshot::from_sources(email(), &[approved_portal(PortalGrants::full())], &[]);
            let now = Utc::now();
            for item in items {
                prop_assert!(snapshot.has_access(&item, now));
            }
        }

        /// Property: a grant whose expiry has passed never opens its item.
        #[test]
        fn expired_grants_never_open(item in arb_item(), days_ago in 0i64..365) {
            let item = CatalogItem { gated: true, ..item };
            let now = Utc::now();
            let snapshot = EntitlementSnapshot::from_sources(
                email(),
                &[],
                &[grant(item.item_ref(), Some(now - Duration::days(days_ago)))],
            );
            prop_assert!(!snapshot.has_access(&item, now));
        }
    }
}
