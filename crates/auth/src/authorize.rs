use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

use trustgate_core::{DomainError, StaffId};

use crate::{Permission, Role};

/// A staff caller, already authenticated by the external identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffPrincipal {
    pub staff_id: StaffId,
    pub roles: Vec<Role>,
}

impl StaffPrincipal {
    pub fn new(staff_id: StaffId, roles: Vec<Role>) -> Self {
        Self { staff_id, roles }
    }

    /// Effective permissions derived from roles.
    pub fn permissions(&self) -> Vec<Permission> {
        permissions_from_roles(&self.roles)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Forbidden(perm) => DomainError::forbidden(format!("missing permission '{perm}'")),
        }
    }
}

/// Authorize a staff principal for one permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &StaffPrincipal, required: &Permission) -> Result<(), AuthzError> {
    let granted = principal.permissions();
    let perms: HashSet<&str> = granted.iter().map(|p| p.as_str()).collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        tracing::debug!(
            staff_id = %principal.staff_id,
            permission = required.as_str(),
            "staff authorization denied"
        );
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Static role→permission mapping.
fn permissions_from_roles(roles: &[Role]) -> Vec<Permission> {
    let mut perms = Vec::new();
    for role in roles {
        match role.as_str() {
            "admin" => return vec![Permission::WILDCARD],
            "reviewer" => {
                perms.push(Permission::REVIEW_REQUESTS);
                perms.push(Permission::MANAGE_GRANTS);
            }
            "catalog_manager" => perms.push(Permission::MANAGE_BUNDLES),
            _ => {}
        }
    }
    perms
}
