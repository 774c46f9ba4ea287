//! Optimistic concurrency guard on the host set version.
//!
//! # Invariants
//! - The version is read and bumped inside the same transaction.
//! - A bump succeeds only when exactly one row still carries the observed
//!   version; the new value is always `observed + 1`.

use crate::model::audit::AuditMessage;
use crate::model::host_set::HostSet;
use crate::repo::backend::MembershipBackend;
use crate::repo::error::{MembershipError, MembershipResult};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

/// Reads the set row; a missing row is `MembershipError::NotFound`.
pub fn read_version<B: MembershipBackend>(
    backend: &B,
    tx: &Transaction<'_>,
    set_id: &str,
) -> MembershipResult<HostSet> {
    if set_id.is_empty() {
        return Err(MembershipError::InvalidArgument("missing public id"));
    }
    backend
        .lookup_set(tx, set_id)?
        .ok_or_else(|| MembershipError::NotFound(set_id.to_string()))
}

/// Compare-and-swap bump of `set.version`.
///
/// Returns the new version and the audit message describing it. A set
/// already at `u32::MAX` is rejected before the update runs.
pub fn bump_version<B: MembershipBackend>(
    backend: &B,
    tx: &Transaction<'_>,
    set: &HostSet,
) -> MembershipResult<(u32, AuditMessage)> {
    let next = set.version.checked_add(1).ok_or_else(|| {
        MembershipError::Inconsistency(format!(
            "version of {} cannot advance past {}",
            set.public_id, set.version
        ))
    })?;
    let updated = backend.compare_and_swap_version(tx, &set.public_id, set.version)?;
    match updated {
        0 => Err(MembershipError::VersionConflict {
            set_id: set.public_id.clone(),
            observed_version: set.version,
        }),
        1 => Ok((next, AuditMessage::set_version(&set.public_id, next))),
        _ => Err(MembershipError::Inconsistency(format!(
            "version update of {} would have touched {updated} rows",
            set.public_id
        ))),
    }
}

/// Loads one host set by id outside of any coordinator transaction.
pub fn get_host_set(conn: &Connection, set_id: &str) -> MembershipResult<Option<HostSet>> {
    lookup_set_row(conn, set_id)
}

pub(crate) fn lookup_set_row(conn: &Connection, set_id: &str) -> MembershipResult<Option<HostSet>> {
    let row = conn
        .query_row(
            "SELECT public_id, catalog_id, scope_id, name, version
             FROM host_sets
             WHERE public_id = ?1;",
            [set_id],
            |row| Ok(parse_host_set_row(row)),
        )
        .optional()?;
    row.transpose()
}

pub(crate) fn update_version_row(
    conn: &Connection,
    set_id: &str,
    observed: u32,
) -> MembershipResult<usize> {
    let updated = conn.execute(
        "UPDATE host_sets
         SET version = version + 1,
             updated_at = (strftime('%s', 'now') * 1000)
         WHERE public_id = ?1
           AND version = ?2;",
        params![set_id, observed],
    )?;
    Ok(updated)
}

fn parse_host_set_row(row: &Row<'_>) -> MembershipResult<HostSet> {
    let version: i64 = row.get("version")?;
    let version = u32::try_from(version)
        .ok()
        .filter(|value| *value > 0)
        .ok_or_else(|| {
            MembershipError::InvalidData(format!("invalid version `{version}` in host_sets"))
        })?;
    Ok(HostSet {
        public_id: row.get("public_id")?,
        catalog_id: row.get("catalog_id")?,
        scope_id: row.get("scope_id")?,
        name: row.get("name")?,
        version,
    })
}
