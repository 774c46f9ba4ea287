//! Error taxonomy for membership operations.
//!
//! # Invariants
//! - Only `VersionConflict` and storage serialization failures are retryable.
//! - Every variant that carries a cause exposes it through `source()`.

use crate::audit::keys::KeyProviderError;
use crate::db::DbError;
use crate::model::host_set::MemberValidationError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type MembershipResult<T> = Result<T, MembershipError>;

#[derive(Debug)]
pub enum MembershipError {
    /// Missing or empty required identifier. Raised before any transaction.
    InvalidArgument(&'static str),
    /// Host set row does not exist.
    NotFound(String),
    /// Compare-and-swap on the set version matched no row.
    VersionConflict { set_id: String, observed_version: u32 },
    /// Retry bound exhausted; `last` is the final retryable failure.
    Conflict {
        set_id: String,
        attempts: u32,
        last: Box<MembershipError>,
    },
    /// Row counts disagree with the request or an identity invariant broke.
    Inconsistency(String),
    /// SQLite I/O, constraint or query failure.
    Storage(DbError),
    /// Audit wrapper could not be obtained or failed to seal.
    KeyProvider(KeyProviderError),
    /// Audit payload could not be encoded.
    Encode(serde_json::Error),
    /// Persisted data cannot be converted into a read model.
    InvalidData(String),
    /// Required table is missing from the connection schema.
    MissingRequiredTable(&'static str),
}

impl MembershipError {
    /// Whether the coordinator may re-run the whole transaction.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::VersionConflict { .. } => true,
            Self::Storage(err) => err.is_serialization_failure(),
            _ => false,
        }
    }

    /// Short stable label used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::VersionConflict { .. } => "version_conflict",
            Self::Conflict { .. } => "conflict",
            Self::Inconsistency(_) => "inconsistency",
            Self::Storage(err) if err.is_serialization_failure() => "serialization_failure",
            Self::Storage(err) if err.is_constraint_violation() => "constraint_violation",
            Self::Storage(_) => "storage_failure",
            Self::KeyProvider(_) => "key_provider_failure",
            Self::Encode(_) => "encode_failure",
            Self::InvalidData(_) => "invalid_data",
            Self::MissingRequiredTable(_) => "missing_table",
        }
    }
}

impl Display for MembershipError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::NotFound(set_id) => write!(f, "host set not found: {set_id}"),
            Self::VersionConflict {
                set_id,
                observed_version,
            } => write!(
                f,
                "host set {set_id} changed after version {observed_version} was read"
            ),
            Self::Conflict {
                set_id,
                attempts,
                last,
            } => write!(
                f,
                "host set {set_id} still conflicting after {attempts} attempts: {last}"
            ),
            Self::Inconsistency(message) => write!(f, "inconsistent membership state: {message}"),
            Self::Storage(err) => write!(f, "storage failure: {err}"),
            Self::KeyProvider(err) => write!(f, "unable to get audit wrapper: {err}"),
            Self::Encode(err) => write!(f, "unable to encode audit payload: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::MissingRequiredTable(table) => {
                write!(f, "membership repository requires table `{table}`")
            }
        }
    }
}

impl Error for MembershipError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Conflict { last, .. } => Some(last.as_ref()),
            Self::Storage(err) => Some(err),
            Self::KeyProvider(err) => Some(err),
            Self::Encode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for MembershipError {
    fn from(value: DbError) -> Self {
        Self::Storage(value)
    }
}

impl From<rusqlite::Error> for MembershipError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(DbError::Sqlite(value))
    }
}

impl From<KeyProviderError> for MembershipError {
    fn from(value: KeyProviderError) -> Self {
        Self::KeyProvider(value)
    }
}

impl From<serde_json::Error> for MembershipError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encode(value)
    }
}

impl From<MemberValidationError> for MembershipError {
    fn from(value: MemberValidationError) -> Self {
        match value {
            MemberValidationError::MissingSetId => Self::InvalidArgument("no set id"),
            MemberValidationError::MissingHostId => Self::InvalidArgument("empty host id"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MembershipError;
    use crate::db::DbError;
    use rusqlite::ffi;
    use std::error::Error;

    #[test]
    fn only_conflicts_and_busy_storage_are_retryable() {
        let conflict = MembershipError::VersionConflict {
            set_id: "hs_1".to_string(),
            observed_version: 3,
        };
        assert!(conflict.is_retryable());

        let busy = MembershipError::Storage(DbError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_BUSY),
            None,
        )));
        assert!(busy.is_retryable());
        assert_eq!(busy.code(), "serialization_failure");

        let duplicate = MembershipError::Storage(DbError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_CONSTRAINT),
            None,
        )));
        assert!(!duplicate.is_retryable());
        assert_eq!(duplicate.code(), "constraint_violation");

        assert!(!MembershipError::NotFound("hs_1".to_string()).is_retryable());
        assert!(!MembershipError::Inconsistency("x".to_string()).is_retryable());
        assert!(!MembershipError::InvalidArgument("no set id").is_retryable());
    }

    #[test]
    fn conflict_exposes_last_cause() {
        let err = MembershipError::Conflict {
            set_id: "hs_1".to_string(),
            attempts: 3,
            last: Box::new(MembershipError::VersionConflict {
                set_id: "hs_1".to_string(),
                observed_version: 7,
            }),
        };
        let source = err.source().expect("conflict should carry its cause");
        assert!(source.to_string().contains("version 7"));
        assert!(!err.is_retryable());
    }
}
