//! Per-item access grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use trustgate_core::{DomainError, Email, GrantId, ItemRef, StaffId};

/// Where a grant came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantSource {
    /// Created by staff, either directly or through a Resources Portal approval.
    Direct,
    /// Created by a Trust Center (NDA) approval.
    Nda,
    /// Created by redeeming a bundle code.
    Bundle,
}

impl GrantSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantSource::Direct => "direct",
            GrantSource::Nda => "nda",
            GrantSource::Bundle => "bundle",
        }
    }
}

impl core::str::FromStr for GrantSource {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(GrantSource::Direct),
            "nda" => Ok(GrantSource::Nda),
            "bundle" => Ok(GrantSource::Bundle),
            other => Err(DomainError::validation(format!(
                "unknown grant source '{other}'"
            ))),
        }
    }
}

/// Authorization for one email on one item, optionally time-bound.
///
/// Independent of any token: a grant may outlive or underlive the token the
/// holder authenticates with. At most one grant exists per `(email, item)`;
/// when two sources grant the same item, the longer-lived one is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatedAccessGrant {
    pub id: GrantId,
    pub email: Email,
    pub item: ItemRef,
    /// `None` means the grant never expires.
    pub expires_at: Option<DateTime<Utc>>,
    pub granted_by: Option<StaffId>,
    pub source: GrantSource,
    pub created_at: DateTime<Utc>,
}

impl GatedAccessGrant {
    pub fn new(
        email: Email,
        item: ItemRef,
        expires_at: Option<DateTime<Utc>>,
        granted_by: Option<StaffId>,
        source: GrantSource,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: GrantId::new(),
            email,
            item,
            expires_at,
            granted_by,
            source,
            created_at: now,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    /// Whether this grant expires strictly later than `other`.
    pub fn outlasts(&self, other: &GatedAccessGrant) -> bool {
        match (self.expires_at, other.expires_at) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(mine), Some(theirs)) => mine > theirs,
        }
    }
}

/// Longest finite grant lifetime, in days.
pub const MAX_GRANT_DAYS: u32 = 36_500;

/// Expiry for a grant created with an optional day count.
///
/// Zero or absent days mean "never expires". Counts above [`MAX_GRANT_DAYS`]
/// are rejected.
pub fn expiry_after_days(
    now: DateTime<Utc>,
    days: Option<u32>,
) -> Result<Option<DateTime<Utc>>, DomainError> {
    match days {
        Some(d) if d > MAX_GRANT_DAYS => Err(DomainError::validation(format!(
            "grant expiry must be at most {MAX_GRANT_DAYS} days"
        ))),
        Some(d) if d > 0 => now
            .checked_add_signed(chrono::Duration::days(i64::from(d)))
            .map(Some)
            .ok_or_else(|| DomainError::validation("grant expiry too far in the future")),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use trustgate_core::ItemId;

    #[test]
    fn expiry_is_exclusive() {
        let now = Utc::now();
        let grant = GatedAccessGrant::new(
            Email::parse("a@x.com").unwrap(),
            ItemRef::Resource(ItemId::new()),
            Some(now),
            None,
            GrantSource::Nda,
            now - Duration::days(1),
        );
        assert!(grant.is_active(now - Duration::seconds(1)));
        assert!(!grant.is_active(now));
    }

    #[test]
    fn never_expiring_grants_outlast_everything() {
        let now = Utc::now();
        let grant = |expires_at| {
            GatedAccessGrant::new(
                Email::parse("a@x.com").unwrap(),
                ItemRef::Resource(ItemId::new()),
                expires_at,
                None,
                GrantSource::Nda,
                now,
            )
        };
        let forever = grant(None);
        let month = grant(Some(now + Duration::days(30)));
        let week = grant(Some(now + Duration::days(7)));

        assert!(forever.outlasts(&month));
        assert!(!month.outlasts(&forever));
        assert!(!forever.outlasts(&forever));
        assert!(month.outlasts(&week));
        assert!(!week.outlasts(&month));
        assert!(!week.outlasts(&week));
    }

    #[test]
    fn zero_days_means_forever() {
        let now = Utc::now();
        assert_eq!(expiry_after_days(now, Some(0)).unwrap(), None);
        assert_eq!(expiry_after_days(now, None).unwrap(), None);
        assert_eq!(
            expiry_after_days(now, Some(30)).unwrap(),
            Some(now + Duration::days(30))
        );
    }

    #[test]
    fn oversized_day_counts_are_rejected() {
        let now = Utc::now();
        assert!(expiry_after_days(now, Some(MAX_GRANT_DAYS)).unwrap().is_some());
        assert!(expiry_after_days(now, Some(MAX_GRANT_DAYS + 1)).is_err());
        assert!(expiry_after_days(now, Some(u32::MAX)).is_err());
    }
}
