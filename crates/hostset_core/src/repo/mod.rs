//! Host set membership persistence.
//!
//! # Responsibility
//! - Coordinate membership mutations as single atomic transactions.
//! - Keep SQL details inside the storage backend and component modules.
//!
//! # Invariants
//! - Components read counts from the backend and decide what they mean;
//!   a backend never reports conflicts or inconsistencies itself.
//! - Repository APIs return semantic errors (`NotFound`, `Conflict`,
//!   `Inconsistency`) in addition to storage errors.
//!
//! Components, leaf first: `member_store`, `diff`, `version`, the audit
//! writer in `crate::audit`, and the coordinator in `set_member_repo`.

pub mod backend;
pub mod diff;
pub mod error;
pub mod fetch;
pub mod member_store;
pub mod retry;
pub mod set_member_repo;
pub mod version;
