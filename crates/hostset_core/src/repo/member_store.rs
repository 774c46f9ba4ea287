//! Bulk insert and delete of host set membership rows.
//!
//! # Invariants
//! - Every inserted or deleted row yields exactly one audit message.
//! - A delete that removes fewer rows than requested fails the whole
//!   transaction; the diff it was based on is stale.

use crate::model::audit::{AuditMessage, OpType};
use crate::model::host_set::SetMember;
use crate::repo::backend::MembershipBackend;
use crate::repo::error::{MembershipError, MembershipResult};
use rusqlite::{params, Connection, Transaction};

/// Inserts `members` and returns one `Create` message per row.
///
/// Duplicate members and hosts outside the set's catalog are rejected by the
/// schema and surface as `MembershipError::Storage`.
pub fn create_members<B: MembershipBackend>(
    backend: &B,
    tx: &Transaction<'_>,
    members: &[SetMember],
) -> MembershipResult<Vec<AuditMessage>> {
    let inserted = backend.insert_members(tx, members)?;
    if inserted != members.len() {
        return Err(MembershipError::Inconsistency(format!(
            "set members created {inserted} did not match request for {}",
            members.len()
        )));
    }
    Ok(members
        .iter()
        .map(|member| AuditMessage::member(OpType::Create, member))
        .collect())
}

/// Deletes `members` and returns one `Delete` message per row.
pub fn delete_members<B: MembershipBackend>(
    backend: &B,
    tx: &Transaction<'_>,
    members: &[SetMember],
) -> MembershipResult<Vec<AuditMessage>> {
    let deleted = backend.delete_members(tx, members)?;
    if deleted != members.len() {
        return Err(MembershipError::Inconsistency(format!(
            "set members deleted {deleted} did not match request for {}",
            members.len()
        )));
    }
    Ok(members
        .iter()
        .map(|member| AuditMessage::member(OpType::Delete, member))
        .collect())
}

pub(crate) fn insert_member_rows(
    conn: &Connection,
    members: &[SetMember],
) -> MembershipResult<usize> {
    // The catalog id is copied from the set so the composite foreign key on
    // (host_id, catalog_id) rejects hosts from other catalogs.
    let mut stmt = conn.prepare_cached(
        "INSERT INTO host_set_members (set_id, host_id, catalog_id)
         SELECT public_id, ?2, catalog_id
         FROM host_sets
         WHERE public_id = ?1;",
    )?;
    let mut inserted = 0;
    for member in members {
        inserted += stmt.execute(params![member.set_id.as_str(), member.host_id.as_str()])?;
    }
    Ok(inserted)
}

pub(crate) fn delete_member_rows(
    conn: &Connection,
    members: &[SetMember],
) -> MembershipResult<usize> {
    let mut stmt = conn.prepare_cached(
        "DELETE FROM host_set_members
         WHERE set_id = ?1
           AND host_id = ?2;",
    )?;
    let mut deleted = 0;
    for member in members {
        deleted += stmt.execute(params![member.set_id.as_str(), member.host_id.as_str()])?;
    }
    Ok(deleted)
}
