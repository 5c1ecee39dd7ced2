//! Compare-and-transition primitives shared by every race-prone workflow.
//!
//! Approvals, rejections and redemption-count increments are all expressed as a
//! single conditional write against the store. The store reports how many rows
//! the write touched; zero means another caller got there first.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Review status shared by Resources Portal and Trust Center requests.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl core::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(DomainError::validation(format!(
                "status must be one of: pending, approved, rejected (got '{other}')"
            ))),
        }
    }
}

/// Number of rows touched by a conditional write.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Affected(pub u64);

impl Affected {
    pub const NONE: Affected = Affected(0);
    pub const ONE: Affected = Affected(1);

    pub fn rows(self) -> u64 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Turn "nothing matched the precondition" into an authoritative conflict.
    pub fn require(self, conflict: impl Into<String>) -> DomainResult<()> {
        if self.is_none() {
            Err(DomainError::conflict(conflict))
        } else {
            Ok(())
        }
    }
}

impl From<u64> for Affected {
    fn from(value: u64) -> Self {
        Affected(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rows_is_a_conflict() {
        let err = Affected::NONE.require("request already reviewed").unwrap_err();
        assert_eq!(err, DomainError::Conflict("request already reviewed".to_string()));
        assert!(Affected::ONE.require("unused").is_ok());
    }

    #[test]
    fn status_parse_is_strict() {
        assert_eq!("approved".parse::<RequestStatus>().unwrap(), RequestStatus::Approved);
        assert!("Approved".parse::<RequestStatus>().is_err());
    }
}
