//! Audit trail records.
//!
//! # Invariants
//! - `ticket` values for one aggregate id are unique and strictly increasing
//!   in commit order.
//! - An entry bundles every operation type of one committed mutation.

use crate::model::host_set::{HostSet, SetMember};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Resource type label written for host set mutations.
pub const HOST_SET_RESOURCE_TYPE: &str = "host-set";

/// Kind of row-level operation recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    Create,
    Update,
    Delete,
}

impl OpType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Per-aggregate ordering token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub aggregate_id: String,
    pub sequence: u64,
}

/// Identification fields stored in clear next to the sealed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMetadata {
    pub resource_id: String,
    pub resource_type: String,
    pub op_types: Vec<OpType>,
    pub scope_id: String,
}

impl AuditMetadata {
    /// Metadata for a mutation of `set` requested in `scope_id`.
    pub fn for_set(set: &HostSet, scope_id: &str) -> Self {
        Self {
            resource_id: set.public_id.clone(),
            resource_type: HOST_SET_RESOURCE_TYPE.to_string(),
            op_types: Vec::new(),
            scope_id: scope_id.to_string(),
        }
    }

    /// Appends an op type unless it is already recorded.
    pub fn push_op(&mut self, op: OpType) {
        if !self.op_types.contains(&op) {
            self.op_types.push(op);
        }
    }
}

/// One row touched by a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMessage {
    pub table: String,
    pub op: OpType,
    pub set_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

impl AuditMessage {
    pub fn member(op: OpType, member: &SetMember) -> Self {
        Self {
            table: "host_set_members".to_string(),
            op,
            set_id: member.set_id.clone(),
            host_id: Some(member.host_id.clone()),
            version: None,
        }
    }

    pub fn set_version(set_id: &str, version: u32) -> Self {
        Self {
            table: "host_sets".to_string(),
            op: OpType::Update,
            set_id: set_id.to_string(),
            host_id: None,
            version: Some(version),
        }
    }
}

/// Plain payload sealed into `AuditEntry::sealed_payload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditPayload {
    pub metadata: AuditMetadata,
    pub ticket: u64,
    pub messages: Vec<AuditMessage>,
}

/// Durable audit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    /// Id of the aggregate the ticket was drawn for (the set id).
    pub aggregate_id: String,
    pub ticket: u64,
    pub resource_type: String,
    pub op_types: Vec<OpType>,
    pub scope_id: String,
    /// Identifies the wrapper key that sealed the payload.
    pub key_id: String,
    pub sealed_payload: Vec<u8>,
    /// Epoch milliseconds.
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::{AuditMessage, AuditMetadata, OpType};
    use crate::model::host_set::HostSet;

    #[test]
    fn push_op_keeps_first_seen_order_without_duplicates() {
        let set = HostSet {
            public_id: "hs_1".to_string(),
            catalog_id: "hc_1".to_string(),
            scope_id: "p_1".to_string(),
            name: None,
            version: 1,
        };
        let mut metadata = AuditMetadata::for_set(&set, "p_1");
        metadata.push_op(OpType::Delete);
        metadata.push_op(OpType::Create);
        metadata.push_op(OpType::Delete);
        assert_eq!(metadata.op_types, vec![OpType::Delete, OpType::Create]);
        assert_eq!(metadata.resource_type, "host-set");
    }

    #[test]
    fn version_message_omits_host_id_when_serialized() {
        let message = AuditMessage::set_version("hs_1", 4);
        let json = serde_json::to_string(&message).unwrap();
        assert!(!json.contains("host_id"));
        assert!(json.contains("\"version\":4"));
    }
}
