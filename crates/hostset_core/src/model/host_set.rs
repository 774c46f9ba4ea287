//! Host set aggregate, membership rows and reconciliation changes.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Versioned parent aggregate whose membership is managed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSet {
    pub public_id: String,
    pub catalog_id: String,
    pub scope_id: String,
    pub name: Option<String>,
    /// Optimistic concurrency token. Starts at 1.
    pub version: u32,
}

/// Association row between a host set and one host.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SetMember {
    pub set_id: String,
    pub host_id: String,
}

/// Rejected in-memory member construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberValidationError {
    MissingSetId,
    MissingHostId,
}

impl Display for MemberValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSetId => write!(f, "missing set id"),
            Self::MissingHostId => write!(f, "missing host id"),
        }
    }
}

impl Error for MemberValidationError {}

impl SetMember {
    /// Builds an in-memory member. Both ids must be non-empty.
    pub fn new(
        set_id: impl Into<String>,
        host_id: impl Into<String>,
    ) -> Result<Self, MemberValidationError> {
        let set_id = set_id.into();
        let host_id = host_id.into();
        if set_id.is_empty() {
            return Err(MemberValidationError::MissingSetId);
        }
        if host_id.is_empty() {
            return Err(MemberValidationError::MissingHostId);
        }
        Ok(Self { set_id, host_id })
    }
}

/// Direction of one reconciliation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Add,
    Delete,
}

impl ChangeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "add" => Some(Self::Add),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// One membership change produced by the diff engine. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub action: ChangeAction,
    pub host_id: String,
}
