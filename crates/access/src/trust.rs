//! Trust Center (NDA-gated) requests.
//!
//! States: `pending -> approved`, `pending -> rejected`. Both targets are
//! terminal.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use trustgate_core::{
    AgreementId, CatalogItem, DomainError, DomainResult, Email, GatedRequestId, ItemRef,
    RequestStatus, SignatureId, StaffId,
};

use crate::portal::optional_text;

const MAX_REASON_LEN: usize = 2000;

/// NDA document a requester signs. Owned by the catalog collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NdaAgreement {
    pub id: AgreementId,
    pub name: String,
    pub version: String,
    /// Only active agreements can be signed.
    pub active: bool,
}

/// Immutable record of one NDA acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NdaSignature {
    pub id: SignatureId,
    pub email: Email,
    pub name: String,
    pub company: Option<String>,
    pub agreement_id: AgreementId,
    pub signed_at: DateTime<Utc>,
    pub ip_address: Option<String>,
}

/// A signature-backed request for gated items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatedAccessRequest {
    pub id: GatedRequestId,
    pub email: Email,
    pub name: String,
    pub company: Option<String>,
    pub nda_signature_id: SignatureId,
    pub status: RequestStatus,
    /// Already filtered to gated catalog items at submission time.
    pub requested_items: Vec<ItemRef>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<StaffId>,
    pub rejection_reason: Option<String>,
}

/// Validated submission, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatedSubmission {
    pub signature: NdaSignature,
    pub request: GatedAccessRequest,
}

/// Raw submission fields, straight from the caller.
#[derive(Debug, Clone)]
pub struct SubmissionInput {
    pub email: Email,
    pub name: String,
    pub company: Option<String>,
    pub accepted_nda: bool,
    pub items: Vec<ItemRef>,
    pub ip_address: Option<String>,
}

impl GatedSubmission {
    /// Build the signature + request pair.
    ///
    /// `agreement` is `None` when the id did not resolve. Requested items that
    /// are unknown or not gated are dropped silently.
    pub fn build(
        input: SubmissionInput,
        agreement: Option<&NdaAgreement>,
        catalog: &[CatalogItem],
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if !input.accepted_nda {
            return Err(DomainError::validation("the NDA must be accepted"));
        }
        let agreement = match agreement {
            Some(a) if a.active => a,
            Some(_) => return Err(DomainError::validation("agreement is no longer active")),
            None => return Err(DomainError::validation("agreement does not exist")),
        };
        let name = optional_text("name", Some(input.name))?
            .ok_or_else(|| DomainError::validation("name is required"))?;
        let company = optional_text("company", input.company)?;

        let signature = NdaSignature {
            id: SignatureId::new(),
            email: input.email.clone(),
            name: name.clone(),
            company: company.clone(),
            agreement_id: agreement.id,
            signed_at: now,
            ip_address: input.ip_address,
        };

        let request = GatedAccessRequest {
            id: GatedRequestId::new(),
            email: input.email,
            name,
            company,
            nda_signature_id: signature.id,
            status: RequestStatus::Pending,
            requested_items: filter_gated(&input.items, catalog),
            created_at: now,
            reviewed_at: None,
            reviewed_by: None,
            rejection_reason: None,
        };

        Ok(Self { signature, request })
    }
}

/// Keep only references to currently gated catalog entries, deduplicated,
/// preserving the caller's order.
pub fn filter_gated(requested: &[ItemRef], catalog: &[CatalogItem]) -> Vec<ItemRef> {
    let gated: HashSet<ItemRef> = catalog
        .iter()
        .filter(|i| i.gated)
        .map(CatalogItem::item_ref)
        .collect();

    let mut seen = BTreeSet::new();
    requested
        .iter()
        .copied()
        .filter(|item| gated.contains(item) && seen.insert(*item))
        .collect()
}

/// Items an approval grants: the requested ones, or every currently gated
/// item when the request named none.
pub fn approval_targets(request: &GatedAccessRequest, catalog: &[CatalogItem]) -> Vec<ItemRef> {
    if request.requested_items.is_empty() {
        catalog
            .iter()
            .filter(|i| i.gated)
            .map(CatalogItem::item_ref)
            .collect()
    } else {
        request.requested_items.clone()
    }
}

pub fn validate_reason(reason: Option<String>) -> DomainResult<Option<String>> {
    match reason.map(|r| r.trim().to_string()) {
        Some(r) if r.is_empty() => Ok(None),
        Some(r) if r.chars().count() > MAX_REASON_LEN => Err(DomainError::validation(format!(
            "reason must be at most {MAX_REASON_LEN} characters"
        ))),
        other => Ok(other),
    }
}
