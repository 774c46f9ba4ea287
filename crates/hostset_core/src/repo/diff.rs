//! Set-difference between desired and stored membership.
//!
//! # Invariants
//! - Changes are computed by one SQL statement; stored membership is never
//!   loaded into memory.
//! - Duplicate desired ids collapse into one change.
//! - Output order: all deletes, then all adds, each by host id ascending.

use crate::model::host_set::{Change, ChangeAction};
use crate::repo::backend::MembershipBackend;
use crate::repo::error::{MembershipError, MembershipResult};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

/// Computes the add/delete steps that turn the current membership of
/// `set_id` into `desired`. An empty `desired` removes every member.
pub fn compute_changes<B: MembershipBackend>(
    backend: &B,
    conn: &Connection,
    set_id: &str,
    desired: &[String],
) -> MembershipResult<Vec<Change>> {
    let changes = backend.membership_changes(conn, set_id, desired)?;
    debug!(
        "event=diff_compute module=repo status=ok set_id={set_id} desired={} changes={}",
        desired.len(),
        changes.len()
    );
    Ok(changes)
}

pub(crate) fn query_changes(
    conn: &Connection,
    set_id: &str,
    desired: &[String],
) -> MembershipResult<Vec<Change>> {
    let sql = changes_sql(desired.len());
    let mut bind_values: Vec<Value> = Vec::with_capacity(desired.len() + 1);
    bind_values.push(Value::Text(set_id.to_string()));
    bind_values.extend(desired.iter().map(|id| Value::Text(id.clone())));

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut changes = Vec::new();
    while let Some(row) = rows.next()? {
        let action_text: String = row.get("action")?;
        let action = ChangeAction::parse(&action_text).ok_or_else(|| {
            MembershipError::InvalidData(format!("invalid change action `{action_text}`"))
        })?;
        changes.push(Change {
            action,
            host_id: row.get("host_id")?,
        });
    }
    Ok(changes)
}

/// `?1` is the set id; `?2..` are the desired host ids.
fn changes_sql(desired_len: usize) -> String {
    let desired_rows = if desired_len == 0 {
        "SELECT NULL WHERE 0".to_string()
    } else {
        let spots: Vec<String> = (2..desired_len + 2).map(|idx| format!("(?{idx})")).collect();
        format!("VALUES {}", spots.join(", "))
    };

    format!(
        "WITH desired (host_id) AS (
            {desired_rows}
         ),
         existing (host_id) AS (
            SELECT host_id
            FROM host_set_members
            WHERE set_id = ?1
         )
         SELECT 0 AS step, 'delete' AS action, host_id
         FROM existing
         WHERE host_id NOT IN (SELECT host_id FROM desired)
         UNION
         SELECT 1 AS step, 'add' AS action, host_id
         FROM desired
         WHERE host_id NOT IN (SELECT host_id FROM existing)
         ORDER BY step ASC, host_id ASC;"
    )
}
