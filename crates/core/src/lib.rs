//! `trustgate-core`: shared primitives for the entitlement engine.
//!
//! This crate contains **pure domain** building blocks (no infrastructure concerns).

pub mod clock;
pub mod email;
pub mod error;
pub mod id;
pub mod item;
pub mod transition;
pub mod value_object;

pub use clock::{Clock, ManualClock, SystemClock};
pub use email::Email;
pub use error::{DomainError, DomainResult};
pub use id::{
    AgreementId, BundleId, CodeId, GatedRequestId, GrantId, ItemId, RequestId, SignatureId,
    StaffId,
};
pub use item::{CatalogItem, ItemKind, ItemRef};
pub use transition::{Affected, RequestStatus};
pub use value_object::ValueObject;
