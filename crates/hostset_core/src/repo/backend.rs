//! Storage seam used by the membership components.
//!
//! Every method reports raw facts (rows, affected counts). Interpreting
//! those counts (not found, conflict, inconsistency) is done by the
//! component modules so that any backend gets the same checks.

use crate::audit::writer;
use crate::model::audit::{AuditEntry, Ticket};
use crate::model::host_set::{Change, HostSet, SetMember};
use crate::repo::diff;
use crate::repo::error::MembershipResult;
use crate::repo::member_store;
use crate::repo::version;
use rusqlite::{Connection, Transaction};

/// Storage operations needed by the transaction coordinator.
pub trait MembershipBackend {
    /// Loads the set row, or `None` when it does not exist.
    fn lookup_set(&self, tx: &Transaction<'_>, set_id: &str) -> MembershipResult<Option<HostSet>>;
    /// Inserts member rows and returns how many were inserted.
    fn insert_members(&self, tx: &Transaction<'_>, members: &[SetMember])
        -> MembershipResult<usize>;
    /// Deletes member rows and returns how many were deleted.
    fn delete_members(&self, tx: &Transaction<'_>, members: &[SetMember])
        -> MembershipResult<usize>;
    /// Increments the set version only if it still equals `observed`.
    /// Returns the number of rows updated.
    fn compare_and_swap_version(
        &self,
        tx: &Transaction<'_>,
        set_id: &str,
        observed: u32,
    ) -> MembershipResult<usize>;
    /// Set difference between `desired` and stored membership of `set_id`.
    fn membership_changes(
        &self,
        conn: &Connection,
        set_id: &str,
        desired: &[String],
    ) -> MembershipResult<Vec<Change>>;
    fn next_ticket(&self, tx: &Transaction<'_>, aggregate_id: &str) -> MembershipResult<Ticket>;
    fn append_audit_entry(&self, tx: &Transaction<'_>, entry: &AuditEntry) -> MembershipResult<()>;
}

/// Default backend issuing SQL against the migrated schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteBackend;

impl MembershipBackend for SqliteBackend {
    fn lookup_set(&self, tx: &Transaction<'_>, set_id: &str) -> MembershipResult<Option<HostSet>> {
        version::lookup_set_row(tx, set_id)
    }

    fn insert_members(
        &self,
        tx: &Transaction<'_>,
        members: &[SetMember],
    ) -> MembershipResult<usize> {
        member_store::insert_member_rows(tx, members)
    }

    fn delete_members(
        &self,
        tx: &Transaction<'_>,
        members: &[SetMember],
    ) -> MembershipResult<usize> {
        member_store::delete_member_rows(tx, members)
    }

    fn compare_and_swap_version(
        &self,
        tx: &Transaction<'_>,
        set_id: &str,
        observed: u32,
    ) -> MembershipResult<usize> {
        version::update_version_row(tx, set_id, observed)
    }

    fn membership_changes(
        &self,
        conn: &Connection,
        set_id: &str,
        desired: &[String],
    ) -> MembershipResult<Vec<Change>> {
        diff::query_changes(conn, set_id, desired)
    }

    fn next_ticket(&self, tx: &Transaction<'_>, aggregate_id: &str) -> MembershipResult<Ticket> {
        writer::next_ticket_row(tx, aggregate_id)
    }

    fn append_audit_entry(&self, tx: &Transaction<'_>, entry: &AuditEntry) -> MembershipResult<()> {
        writer::insert_entry_row(tx, entry)
    }
}
