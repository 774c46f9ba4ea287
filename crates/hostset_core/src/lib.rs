//! Host set membership repository.
//!
//! Manages many-to-many membership between versioned host sets and hosts,
//! with optimistic concurrency on the set version and an append-only,
//! per-set ordered audit trail written in the same transaction as every
//! membership change.

pub mod audit;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;

pub use audit::keys::{HmacKeyProvider, KeyProvider, KeyProviderError, Wrapper};
pub use audit::writer::{list_audit_entries, open_payload};
pub use config::{ConfigError, LoggingConfig, RepositoryConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::audit::{AuditEntry, AuditMessage, AuditMetadata, AuditPayload, OpType, Ticket};
pub use model::host::{Host, HostMembership};
pub use model::host_set::{Change, ChangeAction, HostSet, MemberValidationError, SetMember};
pub use repo::backend::{MembershipBackend, SqliteBackend};
pub use repo::diff::compute_changes;
pub use repo::error::{MembershipError, MembershipResult};
pub use repo::fetch::{fetch_members, ChildEntity, FetchLimit};
pub use repo::retry::RetryPolicy;
pub use repo::set_member_repo::{SetMemberRepository, SqliteSetMemberRepository};
pub use repo::version::get_host_set;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
