//! Host set membership repository.
//!
//! # Responsibility
//! - Validate membership requests before touching storage.
//! - Run each mutation as one transaction: read version, change member rows,
//!   bump version, append one audit entry.
//! - Retry the whole transaction on version conflicts and SQLite
//!   serialization failures.
//!
//! # Invariants
//! - Invalid requests never open a transaction.
//! - A `set_set_members` call whose diff is empty does not open a
//!   transaction and does not bump the version.
//! - Member rows, version and audit entry commit together or not at all.

use crate::audit::keys::{KeyProvider, Wrapper};
use crate::audit::writer;
use crate::config::RepositoryConfig;
use crate::model::audit::{AuditEntry, AuditMetadata, OpType};
use crate::model::host_set::{ChangeAction, HostSet, SetMember};
use crate::repo::backend::{MembershipBackend, SqliteBackend};
use crate::repo::diff;
use crate::repo::error::{MembershipError, MembershipResult};
use crate::repo::fetch::{self, ChildEntity, FetchLimit};
use crate::repo::member_store;
use crate::repo::retry::RetryPolicy;
use crate::repo::version;
use log::{debug, error, info};
use rusqlite::{Connection, TransactionBehavior};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

const REQUIRED_TABLES: [&str; 5] = [
    "hosts",
    "host_sets",
    "host_set_members",
    "audit_tickets",
    "audit_entries",
];

/// Repository interface for host set membership.
pub trait SetMemberRepository {
    /// Adds `host_ids` to `set_id`.
    fn add_set_members(
        &mut self,
        scope_id: &str,
        set_id: &str,
        host_ids: &[String],
    ) -> MembershipResult<()>;
    /// Removes `host_ids` from `set_id` and returns how many were removed.
    fn delete_set_members(
        &mut self,
        scope_id: &str,
        set_id: &str,
        host_ids: &[String],
    ) -> MembershipResult<usize>;
    /// Replaces the members of `set_id` with `host_ids` and returns the
    /// number of adds plus deletes applied. An empty list removes everyone.
    fn set_set_members(
        &mut self,
        scope_id: &str,
        set_id: &str,
        host_ids: &[String],
    ) -> MembershipResult<usize>;
    /// Lists the members of `set_id` as `E`.
    fn fetch_members<E: ChildEntity>(
        &self,
        set_id: &str,
        limit: FetchLimit,
    ) -> MembershipResult<Vec<E>>;
}

#[derive(Debug, Clone, Copy)]
struct Committed {
    version: u32,
    ticket: u64,
    attempts: u32,
}

/// SQLite-backed membership repository.
///
/// Holds one connection; callers wanting concurrency open one repository
/// per thread on the same database file.
pub struct SqliteSetMemberRepository<'conn, B: MembershipBackend = SqliteBackend> {
    conn: &'conn mut Connection,
    keys: Arc<dyn KeyProvider>,
    backend: B,
    retry: RetryPolicy,
}

impl<'conn> SqliteSetMemberRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(
        conn: &'conn mut Connection,
        keys: Arc<dyn KeyProvider>,
        config: &RepositoryConfig,
    ) -> MembershipResult<Self> {
        Self::with_backend(conn, keys, config, SqliteBackend)
    }
}

impl<'conn, B: MembershipBackend> SqliteSetMemberRepository<'conn, B> {
    /// Constructs a repository that issues storage calls through `backend`.
    pub fn with_backend(
        conn: &'conn mut Connection,
        keys: Arc<dyn KeyProvider>,
        config: &RepositoryConfig,
        backend: B,
    ) -> MembershipResult<Self> {
        ensure_membership_connection_ready(conn)?;
        Ok(Self {
            conn,
            keys,
            backend,
            retry: RetryPolicy::from_config(config),
        })
    }

    /// Loads the set row, including its current version.
    pub fn get_host_set(&self, set_id: &str) -> MembershipResult<Option<HostSet>> {
        version::get_host_set(self.conn, set_id)
    }

    /// Committed audit entries for `set_id`, in ticket order.
    pub fn audit_entries(&self, set_id: &str) -> MembershipResult<Vec<AuditEntry>> {
        writer::list_audit_entries(self.conn, set_id)
    }

    fn mutate(
        &mut self,
        op: &'static str,
        scope_id: &str,
        set_id: &str,
        deletions: &[SetMember],
        additions: &[SetMember],
    ) -> MembershipResult<Committed> {
        let started_at = Instant::now();
        let wrapper = self.keys.get_wrapper(scope_id).map_err(|err| {
            error!(
                "event={op} module=repo status=error set_id={set_id} error_code=key_provider_failure error={err}"
            );
            MembershipError::from(err)
        })?;

        let conn = &mut *self.conn;
        let backend = &self.backend;
        let result = self.retry.run(op, set_id, |attempt| {
            debug!("event={op} module=repo status=start set_id={set_id} attempt={attempt}");
            apply_mutation(
                conn,
                backend,
                wrapper.as_ref(),
                scope_id,
                set_id,
                deletions,
                additions,
            )
        });

        match result {
            Ok(((version, ticket), attempts)) => {
                info!(
                    "event={op} module=repo status=ok set_id={set_id} deleted={} added={} version={version} ticket={ticket} attempts={attempts} duration_ms={}",
                    deletions.len(),
                    additions.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(Committed {
                    version,
                    ticket,
                    attempts,
                })
            }
            Err(err) => {
                error!(
                    "event={op} module=repo status=error set_id={set_id} error_code={} duration_ms={} error={err}",
                    err.code(),
                    started_at.elapsed().as_millis()
                );
                Err(err)
            }
        }
    }
}

impl<B: MembershipBackend> SetMemberRepository for SqliteSetMemberRepository<'_, B> {
    fn add_set_members(
        &mut self,
        scope_id: &str,
        set_id: &str,
        host_ids: &[String],
    ) -> MembershipResult<()> {
        validate_target(scope_id, set_id)?;
        let members = new_members(set_id, host_ids)?;
        self.mutate("set_members_add", scope_id, set_id, &[], &members)?;
        Ok(())
    }

    fn delete_set_members(
        &mut self,
        scope_id: &str,
        set_id: &str,
        host_ids: &[String],
    ) -> MembershipResult<usize> {
        validate_target(scope_id, set_id)?;
        let members = new_members(set_id, host_ids)?;
        self.mutate("set_members_delete", scope_id, set_id, &members, &[])?;
        Ok(members.len())
    }

    fn set_set_members(
        &mut self,
        scope_id: &str,
        set_id: &str,
        host_ids: &[String],
    ) -> MembershipResult<usize> {
        validate_target(scope_id, set_id)?;
        if host_ids.iter().any(String::is_empty) {
            return Err(MembershipError::InvalidArgument("empty host id"));
        }

        let changes = diff::compute_changes(&self.backend, self.conn, set_id, host_ids)?;
        if changes.is_empty() {
            debug!("event=set_members_set module=repo status=noop set_id={set_id}");
            return Ok(0);
        }

        let mut deletions = Vec::new();
        let mut additions = Vec::new();
        for change in &changes {
            let member = SetMember::new(set_id, change.host_id.as_str())?;
            match change.action {
                ChangeAction::Delete => deletions.push(member),
                ChangeAction::Add => additions.push(member),
            }
        }

        let committed = self.mutate("set_members_set", scope_id, set_id, &deletions, &additions)?;
        debug!(
            "event=set_members_set module=repo status=committed set_id={set_id} version={} ticket={} attempts={}",
            committed.version, committed.ticket, committed.attempts
        );
        Ok(changes.len())
    }

    fn fetch_members<E: ChildEntity>(
        &self,
        set_id: &str,
        limit: FetchLimit,
    ) -> MembershipResult<Vec<E>> {
        fetch::fetch_members(self.conn, set_id, limit)
    }
}

/// One transaction attempt. Returns the new version and the audit ticket.
///
/// Any error drops `tx`, which rolls back every statement of the attempt.
fn apply_mutation<B: MembershipBackend>(
    conn: &mut Connection,
    backend: &B,
    wrapper: &dyn Wrapper,
    scope_id: &str,
    set_id: &str,
    deletions: &[SetMember],
    additions: &[SetMember],
) -> MembershipResult<(u32, u64)> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
    let set = version::read_version(backend, &tx, set_id)?;

    let mut metadata = AuditMetadata::for_set(&set, scope_id);
    let mut messages = Vec::with_capacity(deletions.len() + additions.len() + 1);
    if !deletions.is_empty() {
        messages.extend(member_store::delete_members(backend, &tx, deletions)?);
        metadata.push_op(OpType::Delete);
    }
    if !additions.is_empty() {
        messages.extend(member_store::create_members(backend, &tx, additions)?);
        metadata.push_op(OpType::Create);
    }

    let (next_version, version_message) = version::bump_version(backend, &tx, &set)?;
    messages.push(version_message);
    let entry = writer::write_entry(backend, &tx, wrapper, &metadata, messages)?;
    tx.commit()?;
    Ok((next_version, entry.ticket))
}

fn validate_target(scope_id: &str, set_id: &str) -> MembershipResult<()> {
    if scope_id.is_empty() {
        return Err(MembershipError::InvalidArgument("no scope id"));
    }
    if set_id.is_empty() {
        return Err(MembershipError::InvalidArgument("no set id"));
    }
    Ok(())
}

/// Builds in-memory members for a non-reconciling request.
///
/// Repeated host ids collapse into one member.
fn new_members(set_id: &str, host_ids: &[String]) -> MembershipResult<Vec<SetMember>> {
    if host_ids.is_empty() {
        return Err(MembershipError::InvalidArgument("no host ids"));
    }
    let unique: BTreeSet<&str> = host_ids.iter().map(String::as_str).collect();
    unique
        .into_iter()
        .map(|host_id| SetMember::new(set_id, host_id).map_err(MembershipError::from))
        .collect()
}

fn ensure_membership_connection_ready(conn: &Connection) -> MembershipResult<()> {
    for table in REQUIRED_TABLES {
        if !table_exists(conn, table)? {
            return Err(MembershipError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> MembershipResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

#[cfg(test)]
mod tests {
    use super::{new_members, validate_target};
    use crate::repo::error::MembershipError;

    #[test]
    fn validate_target_names_the_missing_identifier() {
        assert!(matches!(
            validate_target("", "hs_1"),
            Err(MembershipError::InvalidArgument("no scope id"))
        ));
        assert!(matches!(
            validate_target("p_1", ""),
            Err(MembershipError::InvalidArgument("no set id"))
        ));
        assert!(validate_target("p_1", "hs_1").is_ok());
    }

    #[test]
    fn new_members_collapses_duplicates_and_rejects_blanks() {
        let ids = vec!["h2".to_string(), "h1".to_string(), "h2".to_string()];
        let members = new_members("hs_1", &ids).unwrap();
        let host_ids: Vec<&str> = members.iter().map(|m| m.host_id.as_str()).collect();
        assert_eq!(host_ids, vec!["h1", "h2"]);

        assert!(matches!(
            new_members("hs_1", &[]),
            Err(MembershipError::InvalidArgument("no host ids"))
        ));
        assert!(matches!(
            new_members("hs_1", &["".to_string()]),
            Err(MembershipError::InvalidArgument("empty host id"))
        ));
    }
}
