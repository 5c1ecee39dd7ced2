//! Notification payloads.
//!
//! Payloads carry what a template would need (addresses, links, expiries) but no
//! rendering. Tokens appear only in approval, resend and redemption payloads,
//! which go to the token's own email address.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use trustgate_core::{BundleId, CodeId, Email, GatedRequestId, RequestId};

/// Who a notification is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "email", rename_all = "snake_case")]
pub enum Audience {
    /// The staff review queue.
    Staff,
    /// The person who submitted the request.
    Requester(Email),
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    PortalRequestSubmitted {
        request_id: RequestId,
        email: Email,
        name: Option<String>,
        company: Option<String>,
    },
    PortalApproved {
        request_id: RequestId,
        email: Email,
        token: String,
        full_access: bool,
        expires_at: DateTime<Utc>,
    },
    PortalRejected {
        request_id: RequestId,
        email: Email,
    },
    /// An approved portal request was withdrawn. Same status as a rejection,
    /// different copy.
    PortalRevoked {
        request_id: RequestId,
        email: Email,
    },
    TrustRequestSubmitted {
        request_id: GatedRequestId,
        email: Email,
        name: String,
        company: Option<String>,
        item_count: usize,
    },
    TrustApproved {
        request_id: GatedRequestId,
        email: Email,
        token: String,
        token_expires_at: DateTime<Utc>,
        /// `None` when the granted items never expire.
        grants_expire_at: Option<DateTime<Utc>>,
        item_count: usize,
    },
    TrustRejected {
        request_id: GatedRequestId,
        email: Email,
        reason: Option<String>,
    },
    TrustLinkResent {
        request_id: GatedRequestId,
        email: Email,
        token: String,
        token_expires_at: DateTime<Utc>,
    },
    BundleRedeemed {
        code_id: CodeId,
        bundle_id: BundleId,
        email: Email,
        token: String,
        token_expires_at: DateTime<Utc>,
        item_count: usize,
    },
}

impl Notification {
    /// Stable, log-friendly name of the notification.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PortalRequestSubmitted { .. } => "portal_request_submitted",
            Self::PortalApproved { .. } => "portal_approved",
            Self::PortalRejected { .. } => "portal_rejected",
            Self::PortalRevoked { .. } => "portal_revoked",
            Self::TrustRequestSubmitted { .. } => "trust_request_submitted",
            Self::TrustApproved { .. } => "trust_approved",
            Self::TrustRejected { .. } => "trust_rejected",
            Self::TrustLinkResent { .. } => "trust_link_resent",
            Self::BundleRedeemed { .. } => "bundle_redeemed",
        }
    }

    pub fn audience(&self) -> Audience {
        match self {
            Self::PortalRequestSubmitted { .. } | Self::TrustRequestSubmitted { .. } => {
                Audience::Staff
            }
            Self::PortalApproved { email, .. }
            | Self::PortalRejected { email, .. }
            | Self::PortalRevoked { email, .. }
            | Self::TrustApproved { email, .. }
            | Self::TrustRejected { email, .. }
            | Self::TrustLinkResent { email, .. }
            | Self::BundleRedeemed { email, .. } => Audience::Requester(email.clone()),
        }
    }

    /// Whether the payload contains a bearer token.
    pub fn carries_token(&self) -> bool {
        self.token().is_some()
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Self::PortalApproved { token, .. }
            | Self::TrustApproved { token, .. }
            | Self::TrustLinkResent { token, .. }
            | Self::BundleRedeemed { token, .. } => Some(token),
            _ => None,
        }
    }
}

// Payloads may hold tokens; Debug prints only the kind and audience.
impl core::fmt::Debug for Notification {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Notification")
            .field("kind", &self.kind())
            .field("audience", &self.audience())
            .finish()
    }
}
