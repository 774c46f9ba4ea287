//! Ticketing and append-only persistence of audit entries.

use crate::audit::keys::Wrapper;
use crate::model::audit::{
    AuditEntry, AuditMessage, AuditMetadata, AuditPayload, OpType, Ticket,
};
use crate::repo::backend::MembershipBackend;
use crate::repo::error::{MembershipError, MembershipResult};
use log::debug;
use rusqlite::{params, Connection, Row, Transaction};
use uuid::Uuid;

const AUDIT_SELECT_SQL: &str = "SELECT
    entry_id,
    aggregate_id,
    ticket,
    resource_type,
    op_types,
    scope_id,
    key_id,
    sealed_payload,
    created_at
FROM audit_entries";

/// Seals `messages` under `wrapper` and appends one entry for the aggregate
/// named by `metadata.resource_id`.
///
/// The ticket is drawn from the same transaction as the data mutation, so
/// ticket order matches commit order for that aggregate.
pub fn write_entry<B: MembershipBackend>(
    backend: &B,
    tx: &Transaction<'_>,
    wrapper: &dyn Wrapper,
    metadata: &AuditMetadata,
    messages: Vec<AuditMessage>,
) -> MembershipResult<AuditEntry> {
    if metadata.op_types.is_empty() {
        return Err(MembershipError::Inconsistency(format!(
            "audit entry for {} has no op type",
            metadata.resource_id
        )));
    }

    let ticket = backend.next_ticket(tx, &metadata.resource_id)?;
    let payload = AuditPayload {
        metadata: metadata.clone(),
        ticket: ticket.sequence,
        messages,
    };
    let plaintext = serde_json::to_vec(&payload)?;
    let sealed_payload = wrapper.seal(&plaintext)?;

    let entry = AuditEntry {
        entry_id: Uuid::new_v4(),
        aggregate_id: ticket.aggregate_id,
        ticket: ticket.sequence,
        resource_type: metadata.resource_type.clone(),
        op_types: metadata.op_types.clone(),
        scope_id: metadata.scope_id.clone(),
        key_id: wrapper.key_id().to_string(),
        sealed_payload,
        created_at: now_ms(),
    };
    backend.append_audit_entry(tx, &entry)?;
    debug!(
        "event=audit_write module=audit status=ok aggregate_id={} ticket={} op_types={} messages={}",
        entry.aggregate_id,
        entry.ticket,
        op_types_label(&entry.op_types),
        payload.messages.len()
    );
    Ok(entry)
}

/// Comma-separated op type names, e.g. `delete,create`.
pub(crate) fn op_types_label(op_types: &[OpType]) -> String {
    op_types
        .iter()
        .map(|op| op.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Lists committed entries for one aggregate in ticket order.
pub fn list_audit_entries(
    conn: &Connection,
    aggregate_id: &str,
) -> MembershipResult<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(&format!(
        "{AUDIT_SELECT_SQL}
         WHERE aggregate_id = ?1
         ORDER BY ticket ASC;"
    ))?;
    let mut rows = stmt.query([aggregate_id])?;
    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        entries.push(parse_audit_row(row)?);
    }
    Ok(entries)
}

/// Decodes a sealed payload back into its plain form.
pub fn open_payload(wrapper: &dyn Wrapper, entry: &AuditEntry) -> MembershipResult<AuditPayload> {
    let plaintext = wrapper.open(&entry.sealed_payload)?;
    serde_json::from_slice(&plaintext)
        .map_err(|err| MembershipError::InvalidData(format!("audit payload: {err}")))
}

/// Increments and returns the ticket sequence for `aggregate_id`.
///
/// The upsert takes SQLite's write lock, which serializes concurrent
/// ticket holders for the rest of the transaction.
pub(crate) fn next_ticket_row(conn: &Connection, aggregate_id: &str) -> MembershipResult<Ticket> {
    let sequence: i64 = conn.query_row(
        "INSERT INTO audit_tickets (aggregate_id, sequence)
         VALUES (?1, 1)
         ON CONFLICT (aggregate_id) DO UPDATE
         SET sequence = sequence + 1,
             updated_at = (strftime('%s', 'now') * 1000)
         RETURNING sequence;",
        [aggregate_id],
        |row| row.get(0),
    )?;
    let sequence = u64::try_from(sequence).map_err(|_| {
        MembershipError::InvalidData(format!(
            "negative ticket `{sequence}` in audit_tickets for {aggregate_id}"
        ))
    })?;
    Ok(Ticket {
        aggregate_id: aggregate_id.to_string(),
        sequence,
    })
}

pub(crate) fn insert_entry_row(conn: &Connection, entry: &AuditEntry) -> MembershipResult<()> {
    let ticket = i64::try_from(entry.ticket).map_err(|_| {
        MembershipError::InvalidData(format!("ticket {} does not fit in storage", entry.ticket))
    })?;
    conn.execute(
        "INSERT INTO audit_entries (
            entry_id,
            aggregate_id,
            ticket,
            resource_type,
            op_types,
            scope_id,
            key_id,
            sealed_payload,
            created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
        params![
            entry.entry_id.to_string(),
            entry.aggregate_id.as_str(),
            ticket,
            entry.resource_type.as_str(),
            serde_json::to_string(&entry.op_types)?,
            entry.scope_id.as_str(),
            entry.key_id.as_str(),
            entry.sealed_payload.as_slice(),
            entry.created_at,
        ],
    )?;
    Ok(())
}

fn parse_audit_row(row: &Row<'_>) -> MembershipResult<AuditEntry> {
    let id_text: String = row.get("entry_id")?;
    let entry_id = Uuid::parse_str(&id_text).map_err(|_| {
        MembershipError::InvalidData(format!(
            "invalid uuid value `{id_text}` in audit_entries.entry_id"
        ))
    })?;

    let ticket: i64 = row.get("ticket")?;
    let ticket = u64::try_from(ticket).map_err(|_| {
        MembershipError::InvalidData(format!("invalid ticket `{ticket}` in audit_entries"))
    })?;

    let op_types_text: String = row.get("op_types")?;
    let op_types: Vec<OpType> = serde_json::from_str(&op_types_text).map_err(|_| {
        MembershipError::InvalidData(format!(
            "invalid op types `{op_types_text}` in audit_entries.op_types"
        ))
    })?;

    Ok(AuditEntry {
        entry_id,
        aggregate_id: row.get("aggregate_id")?,
        ticket,
        resource_type: row.get("resource_type")?,
        op_types,
        scope_id: row.get("scope_id")?,
        key_id: row.get("key_id")?,
        sealed_payload: row.get("sealed_payload")?,
        created_at: row.get("created_at")?,
    })
}

fn now_ms() -> i64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::op_types_label;
    use crate::model::audit::OpType;

    #[test]
    fn op_types_label_keeps_recorded_order() {
        assert_eq!(
            op_types_label(&[OpType::Delete, OpType::Create]),
            "delete,create"
        );
        assert_eq!(op_types_label(&[]), "");
    }
}
