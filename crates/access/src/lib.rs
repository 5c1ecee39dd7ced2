//! `trustgate-access`: access-control domain model.
//!
//! Pure types and decisions for the three grant mechanisms (Resources Portal
//! requests, Trust Center NDA requests, bundle codes) and the single resolver
//! that folds them into a yes/no entitlement. No IO lives here.

pub mod bundle;
pub mod grant;
pub mod portal;
pub mod resolver;
pub mod trust;

pub use bundle::{Bundle, Redemption, RedemptionCode};
pub use grant::{GatedAccessGrant, GrantSource};
pub use portal::{PortalGrants, SimpleAccessRequest};
pub use resolver::{has_access, Entitlement, EntitlementScope, EntitlementSnapshot, ItemAccess};
pub use trust::{GatedAccessRequest, GatedSubmission, NdaAgreement, NdaSignature, SubmissionInput};
