//! Request bodies and query strings. Responses serialize engine types directly.

use serde::Deserialize;

use trustgate_access::PortalGrants;
use trustgate_core::{GatedRequestId, ItemRef, RequestStatus};

#[derive(Debug, Deserialize)]
pub struct SimpleRequestBody {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
}

/// Absent body fields mean "no grants"; approval then fails validation.
#[derive(Debug, Default, Deserialize)]
pub struct GrantsBody {
    #[serde(default)]
    pub full_access: bool,
    #[serde(default)]
    pub items: Vec<ItemRef>,
}

impl From<GrantsBody> for PortalGrants {
    fn from(body: GrantsBody) -> Self {
        if body.full_access {
            PortalGrants::full()
        } else {
            PortalGrants::items(body.items)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub status: Option<String>,
}

impl StatusQuery {
    pub fn parse(&self) -> Result<Option<RequestStatus>, trustgate_core::DomainError> {
        self.status.as_deref().map(str::parse).transpose()
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkApproveBody {
    pub ids: Vec<GatedRequestId>,
    #[serde(default)]
    pub grant_expiry_days: Option<u32>,
    #[serde(default = "default_true")]
    pub send_email: bool,
}

#[derive(Debug, Deserialize)]
pub struct BulkRejectBody {
    pub ids: Vec<GatedRequestId>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DirectGrantBody {
    pub email: String,
    pub items: Vec<ItemRef>,
    #[serde(default)]
    pub expiry_days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct BundleBody {
    pub name: String,
    pub items: Vec<ItemRef>,
}

#[derive(Debug, Deserialize)]
pub struct RedeemBody {
    pub code: String,
    pub email: String,
}

fn default_true() -> bool {
    true
}
