//! Issue and audit store implementations: in-memory, JSONL audit file, and SQLite.

mod audit;
pub mod geo;
mod memory;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(test)]
mod test_support;

pub use audit::{InMemoryAuditStore, JsonlAuditStore};
pub use civic_types::{
    AuditJournal, AuditStore, AuditStoreError, IssueQuery, IssueStore, IssueStoreError,
    IssueUpdate, NearbyIssue, NearbyQuery, OverdueSweep,
};

#[cfg(any(test, feature = "test-util"))]
pub use audit::FlakyAuditStore;
pub use memory::InMemoryIssueStore;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteAuditStore, SqliteIssueStore};
