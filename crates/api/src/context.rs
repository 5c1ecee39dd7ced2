use trustgate_auth::{Identity, StaffPrincipal};
use trustgate_engine::ClientContext;

/// Per-request caller context, present on every route.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    identity: Option<Identity>,
    client: ClientContext,
}

impl RequestContext {
    pub fn new(identity: Option<Identity>, client: ClientContext) -> Self {
        Self { identity, client }
    }

    /// Portal identity from `X-Access-Email` / `X-Access-Token`, if both were sent.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn client(&self) -> &ClientContext {
        &self.client
    }
}

/// Authenticated staff caller; only present under `/admin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffContext {
    principal: StaffPrincipal,
}

impl StaffContext {
    pub fn new(principal: StaffPrincipal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &StaffPrincipal {
        &self.principal
    }
}
