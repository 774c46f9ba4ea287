//! Typed reads of the child entities that belong to a set.

use crate::model::host::{Host, HostMembership};
use crate::repo::error::{MembershipError, MembershipResult};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};

/// Upper bound on the number of members returned by `fetch_members`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchLimit {
    #[default]
    Unlimited,
    Limited(u32),
}

/// A child entity that can be scanned from a `hosts` row aliased as `h`.
pub trait ChildEntity: Sized {
    /// Projection over `hosts h`, without `WHERE`/`ORDER BY`.
    const SELECT_SQL: &'static str;

    fn from_row(row: &Row<'_>) -> MembershipResult<Self>;
}

impl ChildEntity for Host {
    const SELECT_SQL: &'static str = "SELECT
        h.public_id AS public_id,
        h.catalog_id AS catalog_id,
        h.name AS name,
        h.description AS description,
        h.address AS address,
        h.version AS version
    FROM hosts h";

    fn from_row(row: &Row<'_>) -> MembershipResult<Self> {
        let version: i64 = row.get("version")?;
        let version = u32::try_from(version).map_err(|_| {
            MembershipError::InvalidData(format!("invalid version `{version}` in hosts"))
        })?;
        Ok(Self {
            public_id: row.get("public_id")?,
            catalog_id: row.get("catalog_id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            address: row.get("address")?,
            version,
        })
    }
}

impl ChildEntity for HostMembership {
    const SELECT_SQL: &'static str = "SELECT
        h.public_id AS public_id,
        (
            SELECT json_group_array(m.set_id)
            FROM host_set_members m
            WHERE m.host_id = h.public_id
        ) AS set_ids
    FROM hosts h";

    fn from_row(row: &Row<'_>) -> MembershipResult<Self> {
        let host_id: String = row.get("public_id")?;
        let aggregated: String = row.get("set_ids")?;
        let mut set_ids: Vec<String> = serde_json::from_str(&aggregated).map_err(|err| {
            MembershipError::InvalidData(format!("set ids of host {host_id}: {err}"))
        })?;
        set_ids.sort();
        Ok(Self { host_id, set_ids })
    }
}

/// Fetches the members of `set_id` as `E`, ordered by host id.
pub fn fetch_members<E: ChildEntity>(
    conn: &Connection,
    set_id: &str,
    limit: FetchLimit,
) -> MembershipResult<Vec<E>> {
    if set_id.is_empty() {
        return Err(MembershipError::InvalidArgument("no set id"));
    }

    let mut sql = format!(
        "{}
         WHERE h.public_id IN (
            SELECT host_id
            FROM host_set_members
            WHERE set_id = ?
         )
         ORDER BY h.public_id ASC",
        E::SELECT_SQL
    );
    let mut bind_values: Vec<Value> = vec![Value::Text(set_id.to_string())];
    if let FetchLimit::Limited(max) = limit {
        sql.push_str(" LIMIT ?");
        bind_values.push(Value::Integer(i64::from(max)));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(E::from_row(row)?);
    }
    Ok(items)
}
