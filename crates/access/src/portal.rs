//! Resources Portal (simple) access requests.
//!
//! States: `pending -> approved`, `pending -> rejected`, `approved -> rejected`
//! (the last one is called "revoke" at the API boundary; the stored status is
//! the same `rejected`).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use trustgate_core::{DomainError, DomainResult, Email, ItemRef, RequestId, RequestStatus, StaffId};

const MAX_NAME_LEN: usize = 200;

/// What an approved portal request unlocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalGrants {
    /// Every gated item, now and in the future.
    pub full_access: bool,
    /// Explicit items; ignored by the resolver when `full_access` is set.
    pub items: BTreeSet<ItemRef>,
}

impl PortalGrants {
    pub fn full() -> Self {
        Self {
            full_access: true,
            items: BTreeSet::new(),
        }
    }

    pub fn items(items: impl IntoIterator<Item = ItemRef>) -> Self {
        Self {
            full_access: false,
            items: items.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.full_access && self.items.is_empty()
    }
}

/// One Resources Portal request. Never hard-deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleAccessRequest {
    pub id: RequestId,
    pub email: Email,
    pub name: Option<String>,
    pub company: Option<String>,
    pub status: RequestStatus,
    pub grants: PortalGrants,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<StaffId>,
}

impl SimpleAccessRequest {
    pub fn submit(
        email: Email,
        name: Option<String>,
        company: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id: RequestId::new(),
            email,
            name: optional_text("name", name)?,
            company: optional_text("company", company)?,
            status: RequestStatus::Pending,
            grants: PortalGrants::default(),
            created_at: now,
            reviewed_at: None,
            reviewed_by: None,
        })
    }

    /// A request that blocks a fresh submission for the same email.
    pub fn is_open(&self) -> bool {
        matches!(self.status, RequestStatus::Pending | RequestStatus::Approved)
    }

    pub fn is_approved(&self) -> bool {
        self.status == RequestStatus::Approved
    }
}

/// Approval must unlock something; an empty grant set is almost certainly a
/// mistake in the review form.
pub fn validate_grants(grants: &PortalGrants) -> DomainResult<()> {
    if grants.is_empty() {
        return Err(DomainError::validation(
            "approval must grant full access or at least one item",
        ));
    }
    Ok(())
}

/// Trim optional free text, treat blank as absent, cap the length.
pub(crate) fn optional_text(field: &str, value: Option<String>) -> DomainResult<Option<String>> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if v.is_empty() => Ok(None),
        Some(v) if v.chars().count() > MAX_NAME_LEN => Err(DomainError::validation(format!(
            "{field} must be at most {MAX_NAME_LEN} characters"
        ))),
        other => Ok(other),
    }
}
