//! Traits for storage backends and external collaborators, plus the error taxonomy.

use crate::{AuditLogEntry, Category, GeoPoint, Issue, IssueStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Change applied to one issue under the store's per-issue atomicity.
///
/// Returning `Err(reason)` aborts the update; nothing is written.
pub type IssueMutation<'a> = Box<dyn FnOnce(&mut Issue) -> Result<(), String> + Send + 'a>;

/// Snapshot of an issue before and after an atomic update.
#[derive(Debug, Clone)]
pub struct IssueUpdate {
    pub before: Issue,
    pub after: Issue,
}

/// Audit entries written in the same atomic scope as an update.
///
/// `entries` sees the pending before/after pair. A failed append aborts the
/// update, so the issue is left as it was.
pub struct AuditJournal<'a> {
    pub audit: &'a dyn AuditStore,
    pub entries: Box<dyn FnOnce(&IssueUpdate) -> Vec<AuditLogEntry> + Send + 'a>,
}

/// Builds the SLA_BREACH entry recorded with each red flag.
pub type BreachEntry<'a> = &'a (dyn Fn(&Issue) -> AuditLogEntry + Send + Sync);

/// Outcome of one overdue sweep.
#[derive(Debug, Default)]
pub struct OverdueSweep {
    /// Issues flipped by this call, in their flagged state.
    pub flagged: Vec<Issue>,
    /// Overdue issues left unflagged because their breach entry could not be written.
    pub deferred: Vec<(String, AuditStoreError)>,
}

/// Village-scoped listing filter.
#[derive(Debug, Clone, Default)]
pub struct IssueQuery {
    pub village: String,
    pub status: Option<IssueStatus>,
    pub category: Option<Category>,
}

/// Proximity query over issues of one category.
#[derive(Debug, Clone)]
pub struct NearbyQuery {
    pub village: String,
    pub category: Category,
    pub point: GeoPoint,
    pub radius_m: f64,
    /// Only issues in one of these statuses are candidates.
    pub statuses: Vec<IssueStatus>,
}

/// Proximity hit with its great-circle distance in meters.
#[derive(Debug, Clone)]
pub struct NearbyIssue {
    pub issue: Issue,
    pub distance_m: f64,
}

/// Issue repository. Every mutation of an existing issue goes through
/// [`IssueStore::update`], [`IssueStore::update_journaled`] or
/// [`IssueStore::flag_overdue`], all atomic per issue.
#[async_trait]
pub trait IssueStore: Send + Sync {
    /// Persist a new issue. Fails if the id already exists.
    async fn insert(&self, issue: Issue) -> Result<(), IssueStoreError>;

    /// Get one issue by id.
    async fn get(&self, id: &str) -> Result<Option<Issue>, IssueStoreError>;

    /// List issues of one village, newest first.
    async fn list(&self, query: &IssueQuery) -> Result<Vec<Issue>, IssueStoreError>;

    /// Issues within `radius_m` of the point, ordered by ascending distance.
    async fn find_nearby(&self, query: &NearbyQuery) -> Result<Vec<NearbyIssue>, IssueStoreError>;

    /// Read, mutate and write back one issue atomically. `updated_at` is set to `now`.
    ///
    /// The store rejects results that violate [`Issue::check_successor_of`].
    async fn update(
        &self,
        id: &str,
        now: DateTime<Utc>,
        mutation: IssueMutation<'_>,
    ) -> Result<IssueUpdate, IssueStoreError>;

    /// Like [`IssueStore::update`], but the journal's entries are appended before
    /// the new state becomes visible. Any append failure leaves the issue unchanged.
    async fn update_journaled(
        &self,
        id: &str,
        now: DateTime<Utc>,
        mutation: IssueMutation<'_>,
        journal: AuditJournal<'_>,
    ) -> Result<IssueUpdate, IssueStoreError>;

    /// Set `is_red_flagged` on every active, unflagged issue whose deadline is before `now`,
    /// appending `entry_for(issue)` with each flip. An issue whose entry cannot be
    /// written stays unflagged so the next sweep picks it up again.
    async fn flag_overdue(
        &self,
        now: DateTime<Utc>,
        audit: &dyn AuditStore,
        entry_for: BreachEntry<'_>,
    ) -> Result<OverdueSweep, IssueStoreError>;
}

/// Append-only audit trail.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one entry. Fails only on storage errors.
    async fn append(&self, entry: AuditLogEntry) -> Result<(), AuditStoreError>;

    /// Entries for one issue, newest first.
    async fn list_for_issue(&self, issue_id: &str) -> Result<Vec<AuditLogEntry>, AuditStoreError>;
}

/// External image storage; only deletion is needed by the engine.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn delete(&self, handle: &str) -> Result<(), ImageStoreError>;
}

/// Wall-clock source.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, thiserror::Error)]
pub enum IssueStoreError {
    #[error("issue not found: {0}")]
    NotFound(String),
    #[error("update rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Audit(#[from] AuditStoreError),
    #[error("issue store error: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AuditStoreError {
    #[error("audit store error: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ImageStoreError {
    #[error("image store error: {0}")]
    Other(String),
}

/// Engine-level error; each variant is a distinct kind for the caller.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("duplicate of issue {duplicate_id}")]
    Duplicate {
        duplicate_id: String,
        suggestion: String,
    },
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("invalid status: {0}")]
    InvalidStatus(String),
    #[error("state error: {0}")]
    State(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage: {0}")]
    Storage(String),
}

impl From<IssueStoreError> for EngineError {
    fn from(e: IssueStoreError) -> Self {
        match e {
            IssueStoreError::NotFound(id) => EngineError::NotFound(format!("issue {}", id)),
            IssueStoreError::Rejected(reason) => EngineError::State(reason),
            IssueStoreError::Audit(e) => EngineError::Storage(e.to_string()),
            IssueStoreError::Other(msg) => EngineError::Storage(msg),
        }
    }
}

impl From<AuditStoreError> for EngineError {
    fn from(e: AuditStoreError) -> Self {
        EngineError::Storage(e.to_string())
    }
}
