//! One SLA sweep: red-flag overdue active issues, each together with its SLA_BREACH entry.

use chrono::{DateTime, Utc};
use civic_types::{
    AuditAction, AuditLogEntry, AuditStore, Clock, Issue, IssueStore, IssueStoreError,
    SYSTEM_SLA_MONITOR,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const DEFAULT_MAX_SWEEP: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("previous sweep still running")]
    Busy,
    #[error("sweep exceeded {0:?}")]
    TimedOut(Duration),
    #[error(transparent)]
    Store(#[from] IssueStoreError),
}

/// Result of one sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepReport {
    pub ran_at: DateTime<Utc>,
    /// Ids flagged by this run.
    pub flagged: Vec<String>,
    /// Overdue ids left unflagged because their SLA_BREACH entry could not be
    /// written; the next run retries them.
    pub deferred: Vec<String>,
}

pub struct SlaMonitor {
    store: Arc<dyn IssueStore>,
    audit: Arc<dyn AuditStore>,
    clock: Arc<dyn Clock>,
    max_duration: Duration,
    in_flight: Mutex<()>,
}

impl SlaMonitor {
    pub fn new(
        store: Arc<dyn IssueStore>,
        audit: Arc<dyn AuditStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            audit,
            clock,
            max_duration: DEFAULT_MAX_SWEEP,
            in_flight: Mutex::new(()),
        }
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Run one sweep now. Returns `Busy` without touching the store if another
    /// sweep is still in flight.
    pub async fn run_once(&self) -> Result<SweepReport, MonitorError> {
        let _guard = self.in_flight.try_lock().map_err(|_| MonitorError::Busy)?;
        let now = self.clock.now();
        match tokio::time::timeout(self.max_duration, self.sweep(now)).await {
            Ok(result) => result,
            Err(_) => Err(MonitorError::TimedOut(self.max_duration)),
        }
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, MonitorError> {
        let breach = |issue: &Issue| {
            AuditLogEntry::new(
                &issue.id,
                SYSTEM_SLA_MONITOR,
                AuditAction::SlaBreach,
                format!(
                    "SLA deadline {} passed while '{}'; issue red-flagged",
                    issue.sla_deadline.to_rfc3339(),
                    issue.status
                ),
                now,
            )
        };
        let sweep = self
            .store
            .flag_overdue(now, self.audit.as_ref(), &breach)
            .await?;
        for (issue_id, e) in &sweep.deferred {
            tracing::error!(
                issue_id = %issue_id,
                error = %e,
                "failed to record SLA breach, flag deferred"
            );
        }
        tracing::info!(
            flagged = sweep.flagged.len(),
            deferred = sweep.deferred.len(),
            "SLA sweep finished"
        );
        Ok(SweepReport {
            ran_at: now,
            flagged: sweep.flagged.into_iter().map(|i| i.id).collect(),
            deferred: sweep.deferred.into_iter().map(|(id, _)| id).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use civic_store::{FlakyAuditStore, InMemoryAuditStore, InMemoryIssueStore};
    use civic_types::{
        Category, GeoPoint, IssueLocation, IssueStatus, ManualClock, VerificationVotes,
    };
    use std::collections::BTreeSet;

    fn issue(id: &str, status: IssueStatus, deadline: DateTime<Utc>) -> Issue {
        Issue {
            id: id.to_string(),
            reporter_id: "reporter".to_string(),
            village: "v1".to_string(),
            title: id.to_string(),
            description: "overdue check".to_string(),
            category: Category::Electricity,
            images: Vec::new(),
            location: IssueLocation {
                point: GeoPoint::new(79.0, 21.0),
                address: None,
            },
            status,
            sla_deadline: deadline,
            is_red_flagged: false,
            assigned_authority: None,
            upvotes: BTreeSet::new(),
            verification_votes: VerificationVotes::default(),
            comment_count: 0,
            created_at: deadline - chrono::Duration::hours(4),
            updated_at: deadline - chrono::Duration::hours(4),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn flags_overdue_active_issues_once() {
        let store = Arc::new(InMemoryIssueStore::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let deadline = t0() + chrono::Duration::hours(4);
        store.insert(issue("late", IssueStatus::InProgress, deadline)).await.unwrap();
        store.insert(issue("done", IssueStatus::Resolved, deadline)).await.unwrap();
        store
            .insert(issue("later", IssueStatus::Submitted, deadline + chrono::Duration::hours(10)))
            .await
            .unwrap();
        let monitor = SlaMonitor::new(store.clone(), audit.clone(), clock.clone());

        let early = monitor.run_once().await.unwrap();
        assert!(early.flagged.is_empty());

        clock.advance(chrono::Duration::hours(5));
        let report = monitor.run_once().await.unwrap();
        assert_eq!(report.flagged, vec!["late".to_string()]);
        assert!(report.deferred.is_empty());

        let late = store.get("late").await.unwrap().unwrap();
        assert!(late.is_red_flagged);
        assert_eq!(late.status, IssueStatus::InProgress);
        assert!(!store.get("done").await.unwrap().unwrap().is_red_flagged);

        let entries = audit.list_for_issue("late").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::SlaBreach);
        assert_eq!(entries[0].actor_id, SYSTEM_SLA_MONITOR);

        let again = monitor.run_once().await.unwrap();
        assert!(again.flagged.is_empty());
        assert_eq!(audit.list_for_issue("late").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn breach_is_retried_when_audit_write_fails() {
        let store = Arc::new(InMemoryIssueStore::new());
        let audit = Arc::new(FlakyAuditStore::new());
        let clock = Arc::new(ManualClock::new(t0() + chrono::Duration::hours(5)));
        store
            .insert(issue("late", IssueStatus::Submitted, t0() + chrono::Duration::hours(4)))
            .await
            .unwrap();
        let monitor = SlaMonitor::new(store.clone(), audit.clone(), clock.clone());

        audit.set_failing(true);
        let report = monitor.run_once().await.unwrap();
        assert!(report.flagged.is_empty());
        assert_eq!(report.deferred, vec!["late".to_string()]);
        assert!(!store.get("late").await.unwrap().unwrap().is_red_flagged);
        assert!(audit.list_for_issue("late").await.unwrap().is_empty());

        audit.set_failing(false);
        clock.advance(chrono::Duration::hours(1));
        let report = monitor.run_once().await.unwrap();
        assert_eq!(report.flagged, vec!["late".to_string()]);
        assert!(report.deferred.is_empty());
        assert!(store.get("late").await.unwrap().unwrap().is_red_flagged);
        let entries = audit.list_for_issue("late").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::SlaBreach);
        assert_eq!(entries[0].created_at, clock.now());
    }

    #[tokio::test]
    async fn overlapping_run_is_skipped() {
        let monitor = SlaMonitor::new(
            Arc::new(InMemoryIssueStore::new()),
            Arc::new(InMemoryAuditStore::new()),
            Arc::new(ManualClock::new(t0())),
        );
        let _held = monitor.in_flight.lock().await;
        assert!(matches!(monitor.run_once().await, Err(MonitorError::Busy)));
    }
}
