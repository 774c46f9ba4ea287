//! SQLite storage bootstrap and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the host set repository.
//! - Apply schema migrations in deterministic order.
//! - Classify SQLite failures that are safe to retry.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Repositories must not touch membership data before migrations succeed.

use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory, BUSY_TIMEOUT};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl DbError {
    /// Returns `true` when SQLite refused the write because another
    /// connection holds the lock or committed after our read snapshot.
    ///
    /// Covers `SQLITE_BUSY` (including `SQLITE_BUSY_SNAPSHOT`) and
    /// `SQLITE_LOCKED`.
    pub fn is_serialization_failure(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Returns `true` for primary key, unique and foreign key violations.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation
        )
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

#[cfg(test)]
mod tests {
    use super::DbError;
    use rusqlite::ffi;

    fn failure(code: i32) -> DbError {
        DbError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(code),
            None,
        ))
    }

    #[test]
    fn busy_and_locked_are_serialization_failures() {
        assert!(failure(ffi::SQLITE_BUSY).is_serialization_failure());
        assert!(failure(ffi::SQLITE_BUSY_SNAPSHOT).is_serialization_failure());
        assert!(failure(ffi::SQLITE_LOCKED).is_serialization_failure());
        assert!(!failure(ffi::SQLITE_CONSTRAINT_PRIMARYKEY).is_serialization_failure());
    }

    #[test]
    fn constraint_codes_are_detected() {
        assert!(failure(ffi::SQLITE_CONSTRAINT_PRIMARYKEY).is_constraint_violation());
        assert!(failure(ffi::SQLITE_CONSTRAINT_FOREIGNKEY).is_constraint_violation());
        assert!(!failure(ffi::SQLITE_BUSY).is_constraint_violation());
    }
}
