//! Domain model for host sets, their members and the audit trail.
//!
//! # Responsibility
//! - Define the records the repository reads and writes.
//! - Keep identifiers opaque: callers validate them, core only checks presence.
//!
//! # Invariants
//! - A `HostSet` version only moves forward, one step per committed mutation.
//! - A `SetMember` is identified by its `(set_id, host_id)` pair alone.
//! - `AuditEntry` values are never mutated after they are persisted.

pub mod audit;
pub mod host;
pub mod host_set;
