//! Child entities that can be fetched through set membership.

use serde::{Deserialize, Serialize};

/// Host record owned by a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub public_id: String,
    pub catalog_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub address: String,
    pub version: u32,
}

/// Host id together with every set it currently belongs to.
///
/// `set_ids` is sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostMembership {
    pub host_id: String,
    pub set_ids: Vec<String>,
}
