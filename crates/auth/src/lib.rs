//! `trustgate-auth`: bearer tokens, portal identities and staff authorization.
//!
//! This crate is intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod identity;
pub mod permissions;
pub mod roles;
pub mod token;

pub use authorize::{authorize, AuthzError, StaffPrincipal};
pub use identity::Identity;
pub use permissions::Permission;
pub use roles::Role;
pub use token::{
    check_token, generate_token, AccessToken, TokenOrigin, TokenValidationError, TokenVerification,
};
