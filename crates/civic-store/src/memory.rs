//! In-memory issue store with proximity search.

use crate::geo;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use civic_types::{
    AuditJournal, AuditStore, BreachEntry, Issue, IssueMutation, IssueQuery, IssueStore,
    IssueStoreError, IssueUpdate, NearbyIssue, NearbyQuery, OverdueSweep,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory implementation of IssueStore.
/// A single write lock covers every mutation, so updates are atomic per issue.
pub struct InMemoryIssueStore {
    /// issue_id -> issue.
    issues: Arc<RwLock<HashMap<String, Issue>>>,
}

impl InMemoryIssueStore {
    pub fn new() -> Self {
        Self {
            issues: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryIssueStore {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn matches_query(issue: &Issue, query: &IssueQuery) -> bool {
    issue.village == query.village
        && query.status.map_or(true, |s| issue.status == s)
        && query.category.map_or(true, |c| issue.category == c)
}

/// Distance to the query point when the issue is a proximity candidate.
pub(crate) fn nearby_distance(issue: &Issue, query: &NearbyQuery) -> Option<f64> {
    if issue.village != query.village
        || issue.category != query.category
        || !query.statuses.contains(&issue.status)
    {
        return None;
    }
    let d = geo::distance_m(&issue.location.point, &query.point);
    (d <= query.radius_m).then_some(d)
}

pub(crate) fn sort_by_distance(hits: &mut [NearbyIssue]) {
    hits.sort_by(|a, b| {
        a.distance_m
            .total_cmp(&b.distance_m)
            .then_with(|| a.issue.id.cmp(&b.issue.id))
    });
}

pub(crate) fn sort_newest_first(issues: &mut [Issue]) {
    issues.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// Applies `mutation` to a copy of `current` and checks the result.
pub(crate) fn apply_mutation(
    current: &Issue,
    now: DateTime<Utc>,
    mutation: IssueMutation<'_>,
) -> Result<Issue, IssueStoreError> {
    let mut next = current.clone();
    mutation(&mut next).map_err(IssueStoreError::Rejected)?;
    next.updated_at = now;
    next.check_successor_of(current)
        .map_err(IssueStoreError::Rejected)?;
    Ok(next)
}

pub(crate) fn is_overdue(issue: &Issue, now: DateTime<Utc>) -> bool {
    issue.status.is_active() && !issue.is_red_flagged && issue.sla_deadline < now
}

#[async_trait]
impl IssueStore for InMemoryIssueStore {
    async fn insert(&self, issue: Issue) -> Result<(), IssueStoreError> {
        let mut guard = self.issues.write().await;
        if guard.contains_key(&issue.id) {
            return Err(IssueStoreError::Other(format!(
                "issue already exists: {}",
                issue.id
            )));
        }
        guard.insert(issue.id.clone(), issue);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Issue>, IssueStoreError> {
        let guard = self.issues.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn list(&self, query: &IssueQuery) -> Result<Vec<Issue>, IssueStoreError> {
        let guard = self.issues.read().await;
        let mut out: Vec<Issue> = guard
            .values()
            .filter(|i| matches_query(i, query))
            .cloned()
            .collect();
        sort_newest_first(&mut out);
        Ok(out)
    }

    async fn find_nearby(&self, query: &NearbyQuery) -> Result<Vec<NearbyIssue>, IssueStoreError> {
        let guard = self.issues.read().await;
        let mut hits: Vec<NearbyIssue> = guard
            .values()
            .filter_map(|issue| {
                nearby_distance(issue, query).map(|distance_m| NearbyIssue {
                    issue: issue.clone(),
                    distance_m,
                })
            })
            .collect();
        sort_by_distance(&mut hits);
        Ok(hits)
    }

    async fn update(
        &self,
        id: &str,
        now: DateTime<Utc>,
        mutation: IssueMutation<'_>,
    ) -> Result<IssueUpdate, IssueStoreError> {
        self.write_update(id, now, mutation, None).await
    }

    async fn update_journaled(
        &self,
        id: &str,
        now: DateTime<Utc>,
        mutation: IssueMutation<'_>,
        journal: AuditJournal<'_>,
    ) -> Result<IssueUpdate, IssueStoreError> {
        self.write_update(id, now, mutation, Some(journal)).await
    }

    async fn flag_overdue(
        &self,
        now: DateTime<Utc>,
        audit: &dyn AuditStore,
        entry_for: BreachEntry<'_>,
    ) -> Result<OverdueSweep, IssueStoreError> {
        let mut guard = self.issues.write().await;
        let mut ids: Vec<String> = guard
            .values()
            .filter(|i| is_overdue(i, now))
            .map(|i| i.id.clone())
            .collect();
        ids.sort();

        let mut sweep = OverdueSweep::default();
        for id in ids {
            let Some(issue) = guard.get_mut(&id) else {
                continue;
            };
            let mut next = issue.clone();
            next.is_red_flagged = true;
            next.updated_at = now;
            // The flag is set with no await after the append, so an entry is never lost.
            match audit.append(entry_for(&next)).await {
                Ok(()) => {
                    *issue = next.clone();
                    sweep.flagged.push(next);
                }
                Err(e) => sweep.deferred.push((id, e)),
            }
        }
        Ok(sweep)
    }
}

impl InMemoryIssueStore {
    /// The new state replaces the stored one only after every journal entry is appended.
    async fn write_update(
        &self,
        id: &str,
        now: DateTime<Utc>,
        mutation: IssueMutation<'_>,
        journal: Option<AuditJournal<'_>>,
    ) -> Result<IssueUpdate, IssueStoreError> {
        let mut guard = self.issues.write().await;
        let current = guard
            .get_mut(id)
            .ok_or_else(|| IssueStoreError::NotFound(id.to_string()))?;
        let update = IssueUpdate {
            after: apply_mutation(current, now, mutation)?,
            before: current.clone(),
        };
        if let Some(journal) = journal {
            for entry in (journal.entries)(&update) {
                journal.audit.append(entry).await?;
            }
        }
        *current = update.after.clone();
        Ok(update)
    }
}
