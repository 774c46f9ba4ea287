#![allow(dead_code)]

use hostset_core::db::open_db_in_memory;
use hostset_core::{HmacKeyProvider, KeyProvider, RepositoryConfig};
use rusqlite::{params, Connection};
use std::sync::Arc;

pub const SCOPE: &str = "p_1234567890";
pub const CATALOG: &str = "hc_1234567890";
pub const SET: &str = "hs_1234567890";

pub fn setup() -> Connection {
    let conn = open_db_in_memory().unwrap();
    seed_catalog(&conn, CATALOG, SCOPE);
    seed_hosts(&conn, CATALOG, &["h1", "h2", "h3", "h4", "h5"]);
    seed_set(&conn, SET, CATALOG, SCOPE);
    conn
}

pub fn seed_catalog(conn: &Connection, catalog_id: &str, scope_id: &str) {
    conn.execute(
        "INSERT INTO host_catalogs (public_id, scope_id) VALUES (?1, ?2);",
        params![catalog_id, scope_id],
    )
    .unwrap();
}

pub fn seed_hosts(conn: &Connection, catalog_id: &str, host_ids: &[&str]) {
    for host_id in host_ids {
        conn.execute(
            "INSERT INTO hosts (public_id, catalog_id, name, address)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                host_id,
                catalog_id,
                format!("name-{host_id}"),
                format!("{host_id}.internal")
            ],
        )
        .unwrap();
    }
}

pub fn seed_set(conn: &Connection, set_id: &str, catalog_id: &str, scope_id: &str) {
    conn.execute(
        "INSERT INTO host_sets (public_id, catalog_id, scope_id) VALUES (?1, ?2, ?3);",
        params![set_id, catalog_id, scope_id],
    )
    .unwrap();
}

pub fn set_version(conn: &Connection, set_id: &str) -> u32 {
    conn.query_row(
        "SELECT version FROM host_sets WHERE public_id = ?1;",
        [set_id],
        |row| row.get(0),
    )
    .unwrap()
}

pub fn member_ids(conn: &Connection, set_id: &str) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT host_id FROM host_set_members WHERE set_id = ?1 ORDER BY host_id;")
        .unwrap();
    let mut rows = stmt.query([set_id]).unwrap();
    let mut ids = Vec::new();
    while let Some(row) = rows.next().unwrap() {
        ids.push(row.get(0).unwrap());
    }
    ids
}

pub fn audit_count(conn: &Connection, aggregate_id: &str) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM audit_entries WHERE aggregate_id = ?1;",
        [aggregate_id],
        |row| row.get(0),
    )
    .unwrap()
}

pub fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

pub fn key_provider() -> Arc<dyn KeyProvider> {
    Arc::new(HmacKeyProvider::new(b"integration-root-key".to_vec()).unwrap())
}

pub fn fast_config() -> RepositoryConfig {
    RepositoryConfig {
        max_attempts: Some(20),
        base_backoff_ms: Some(1),
        max_backoff_ms: Some(20),
    }
}
