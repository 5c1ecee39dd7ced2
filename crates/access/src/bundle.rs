//! Bundles and redemption codes.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use trustgate_core::{BundleId, CodeId, DomainError, DomainResult, Email, ItemRef};

/// Length of generated codes.
pub const GENERATED_CODE_LEN: usize = 12;

/// Largest redemption cap; counters are stored as 32-bit signed integers.
pub const MAX_REDEMPTIONS: u32 = i32::MAX as u32;

const MIN_CODE_LEN: usize = 4;
const MAX_CODE_LEN: usize = 64;

// No 0/O or 1/I: codes are typed by hand.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Named set of items unlocked together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: BundleId,
    pub name: String,
    pub items: Vec<ItemRef>,
    pub created_at: DateTime<Utc>,
}

impl Bundle {
    pub fn new(name: &str, items: Vec<ItemRef>, now: DateTime<Utc>) -> DomainResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("bundle name is required"));
        }

        let mut seen = BTreeSet::new();
        let items: Vec<ItemRef> = items.into_iter().filter(|i| seen.insert(*i)).collect();
        if items.is_empty() {
            return Err(DomainError::validation("bundle must contain at least one item"));
        }

        Ok(Self {
            id: BundleId::new(),
            name: name.to_string(),
            items,
            created_at: now,
        })
    }
}

/// A code that unlocks one bundle, with optional expiry and usage cap.
///
/// Invariant: `redeemed_count <= max_redemptions` whenever a cap is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionCode {
    pub id: CodeId,
    pub bundle_id: BundleId,
    pub code: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_redemptions: Option<u32>,
    pub redeemed_count: u32,
    pub created_at: DateTime<Utc>,
}

impl RedemptionCode {
    pub fn new(
        bundle_id: BundleId,
        code: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
        max_redemptions: Option<u32>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let code = match code {
            Some(raw) => normalize_code(raw)?,
            None => generate_code(),
        };
        match max_redemptions {
            Some(0) => return Err(DomainError::validation("max redemptions must be at least 1")),
            Some(max) if max > MAX_REDEMPTIONS => {
                return Err(DomainError::validation(format!(
                    "max redemptions must be at most {MAX_REDEMPTIONS}"
                )));
            }
            _ => {}
        }
        if let Some(at) = expires_at {
            if at <= now {
                return Err(DomainError::validation("code expiry must be in the future"));
            }
        }

        Ok(Self {
            id: CodeId::new(),
            bundle_id,
            code,
            expires_at,
            max_redemptions,
            redeemed_count: 0,
            created_at: now,
        })
    }

    /// Expiry check done before any write. Capacity is enforced by the store's
    /// conditional increment, not here.
    pub fn check_not_expired(&self, now: DateTime<Utc>) -> DomainResult<()> {
        match self.expires_at {
            Some(at) if now > at => Err(DomainError::expired(format!("code {} expired", self.code))),
            _ => Ok(()),
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.max_redemptions.is_none_or(|max| self.redeemed_count < max)
    }
}

/// Audit row: one per `(code, email)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub code_id: CodeId,
    pub email: Email,
    pub redeemed_at: DateTime<Utc>,
}

/// Codes compare case-insensitively; the stored form is upper-case.
pub fn normalize_code(raw: &str) -> DomainResult<String> {
    let code = raw.trim().to_uppercase();
    if code.len() < MIN_CODE_LEN || code.len() > MAX_CODE_LEN {
        return Err(DomainError::validation(format!(
            "code must be {MIN_CODE_LEN}-{MAX_CODE_LEN} characters"
        )));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(DomainError::validation("code may contain only letters, digits and '-'"));
    }
    Ok(code)
}

pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..GENERATED_CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}
