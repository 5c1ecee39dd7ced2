//! `trustgate-engine`: entitlement and grant-lifecycle engine.
//!
//! [`AccessEngine`] composes the injected store, catalog, rate limiter, notifier
//! and clock, and exposes every portal, Trust Center and bundle operation.
//!
//! ## Execution model
//!
//! - Every operation is a bounded request/response; nothing runs in the background
//! - State changes happen inside one store unit of work and are all-or-nothing
//! - Notifications are sent after commit; their failure only clears `notified`
//! - Portal callers pass an explicit [`Identity`]; staff callers a [`StaffPrincipal`]

pub mod bundles;
pub mod config;
pub mod entitlements;
pub mod error;
pub mod grants;
pub mod portal;
pub mod tokens;
pub mod trust_center;

use std::sync::Arc;

use serde::Serialize;

use trustgate_auth::{authorize, Permission, StaffPrincipal};
use trustgate_core::{Clock, DomainError, SystemClock};
use trustgate_infra::{
    AccessStore, Catalog, InMemoryRateLimiter, RateKey, RateLimitPolicy, RateLimiter,
};
use trustgate_notify::{Notification, Notifier, TracingNotifier};

pub use trustgate_auth::Identity;

pub use bundles::{CodeSpec, Redeemed};
pub use config::{EngineConfig, RateLimits};
pub use error::{AccessError, AccessResult};
pub use portal::{SimpleApproval, SimpleSubmission};
pub use trust_center::{
    BulkFailure, BulkOutcome, GatedApproval, GatedApprovalOptions, GatedRejectionOptions,
    GatedResend, GatedSubmissionRequest, GatedSubmitted,
};

/// Caller context for unauthenticated entry points (rate limiting, audit).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    pub ip_address: Option<String>,
}

impl ClientContext {
    pub fn from_ip(ip: impl Into<String>) -> Self {
        Self {
            ip_address: Some(ip.into()),
        }
    }

    fn rate_identity(&self) -> &str {
        self.ip_address.as_deref().unwrap_or("unknown")
    }
}

/// Result of a review action that changes status without issuing anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewOutcome<Id> {
    pub request_id: Id,
    pub status: trustgate_core::RequestStatus,
    pub notified: bool,
}

pub struct AccessEngine {
    store: Arc<dyn AccessStore>,
    catalog: Arc<dyn Catalog>,
    limiter: Arc<dyn RateLimiter>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl AccessEngine {
    pub fn builder(store: Arc<dyn AccessStore>, catalog: Arc<dyn Catalog>) -> AccessEngineBuilder {
        AccessEngineBuilder {
            store,
            catalog,
            limiter: None,
            notifier: None,
            clock: None,
            config: EngineConfig::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn AccessStore> {
        &self.store
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    fn require(&self, principal: &StaffPrincipal, permission: &Permission) -> AccessResult<()> {
        authorize(principal, permission)?;
        Ok(())
    }

    async fn throttle(
        &self,
        purpose: &'static str,
        identity: &str,
        policy: &RateLimitPolicy,
    ) -> AccessResult<()> {
        let key = RateKey::new(purpose, identity);
        if self.limiter.allow(&key, policy).await {
            Ok(())
        } else {
            tracing::info!(purpose, "request throttled");
            Err(DomainError::rate_limited(format!("too many attempts ({purpose}); retry later")).into())
        }
    }

    /// Publish after commit. Never fails the caller.
    async fn deliver(&self, notification: Notification) -> bool {
        let kind = notification.kind();
        match tokio::time::timeout(self.config.notify_timeout(), self.notifier.notify(notification))
            .await
        {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                tracing::warn!(kind, error = %err, "notification failed");
                false
            }
            Err(_) => {
                tracing::warn!(kind, "notification timed out");
                false
            }
        }
    }
}

pub struct AccessEngineBuilder {
    store: Arc<dyn AccessStore>,
    catalog: Arc<dyn Catalog>,
    limiter: Option<Arc<dyn RateLimiter>>,
    notifier: Option<Arc<dyn Notifier>>,
    clock: Option<Arc<dyn Clock>>,
    config: EngineConfig,
}

impl AccessEngineBuilder {
    pub fn rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Unset parts default to the system clock, an in-memory limiter on that
    /// clock and a log-only notifier.
    pub fn build(self) -> AccessEngine {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let limiter = self
            .limiter
            .unwrap_or_else(|| Arc::new(InMemoryRateLimiter::new(clock.clone())));
        AccessEngine {
            store: self.store,
            catalog: self.catalog,
            limiter,
            notifier: self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier)),
            clock,
            config: self.config,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixture for the engine's unit tests.

    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use trustgate_auth::{Role, StaffPrincipal};
    use trustgate_core::{ItemKind, ItemRef, ManualClock, StaffId};
    use trustgate_infra::{InMemoryAccessStore, InMemoryCatalog};
    use trustgate_notify::RecordingNotifier;

    use super::{AccessEngine, EngineConfig};

    pub struct Harness {
        pub engine: Arc<AccessEngine>,
        pub store: Arc<InMemoryAccessStore>,
        pub catalog: Arc<InMemoryCatalog>,
        pub clock: Arc<ManualClock>,
        pub notifier: Arc<RecordingNotifier>,
        pub gated: Vec<ItemRef>,
        pub public: ItemRef,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with_config(EngineConfig::default())
        }

        pub fn with_config(config: EngineConfig) -> Self {
            let (catalog, gated_a) = InMemoryCatalog::new().with_item(ItemKind::Resource, true);
            let (catalog, gated_b) = catalog.with_item(ItemKind::Article, true);
            let (catalog, public) = catalog.with_item(ItemKind::Resource, false);
            let catalog = Arc::new(catalog);

            let store = Arc::new(InMemoryAccessStore::new());
            let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap()));
            let notifier = Arc::new(RecordingNotifier::new());

            let engine = AccessEngine::builder(store.clone(), catalog.clone())
                .clock(clock.clone())
                .notifier(notifier.clone())
                .config(config)
                .build();

            Self {
                engine: Arc::new(engine),
                store,
                catalog,
                clock,
                notifier,
                gated: vec![gated_a, gated_b],
                public,
            }
        }

        pub fn reviewer(&self) -> StaffPrincipal {
            StaffPrincipal::new(StaffId::new(), vec![Role::REVIEWER])
        }

        pub fn admin(&self) -> StaffPrincipal {
            StaffPrincipal::new(StaffId::new(), vec![Role::ADMIN])
        }

        pub fn nobody(&self) -> StaffPrincipal {
            StaffPrincipal::new(StaffId::new(), Vec::new())
        }
    }
}
