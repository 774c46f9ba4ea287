//! Audit trail for host set mutations.
//!
//! # Responsibility
//! - Hand out per-aggregate ordering tickets.
//! - Seal and append exactly one entry per committed mutation.
//!
//! # Invariants
//! - Tickets and entries are written inside the caller's transaction, so a
//!   rolled-back mutation leaves neither behind.
//! - Entries are never updated or deleted once committed.

pub mod keys;
pub mod writer;
