//! IssueEngine: the operations exposed to callers, composed from the store,
//! audit trail, SLA table, duplicate detector, transition manager and consensus engine.

use crate::analytics;
use crate::consensus::{ConsensusEngine, ConsensusRules};
use crate::duplicate::{DuplicateDetector, UPVOTE_SUGGESTION};
use crate::sla::SlaTable;
use crate::transition::{TransitionManager, TransitionPolicy};
use civic_types::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

pub const MAX_TITLE_CHARS: usize = 100;

/// Intake fields after validation.
struct ValidatedIssue {
    title: String,
    description: String,
    category: Category,
    location: IssueLocation,
    images: Vec<ImageRef>,
}

fn required(field: &str, value: Option<&str>) -> Result<String, EngineError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(EngineError::Validation(format!("{} is required", field))),
    }
}

fn validate(reporter: &Actor, req: CreateIssueRequest) -> Result<ValidatedIssue, EngineError> {
    if reporter.village.trim().is_empty() {
        return Err(EngineError::Validation(
            "reporter has no village".to_string(),
        ));
    }
    let title = required("title", req.title.as_deref())?;
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(EngineError::Validation(format!(
            "title cannot be more than {} characters",
            MAX_TITLE_CHARS
        )));
    }
    let description = required("description", req.description.as_deref())?;
    let raw_category = required("category", req.category.as_deref())?;
    let category = Category::parse(&raw_category).ok_or_else(|| {
        EngineError::Validation(format!("unknown category '{}'", raw_category))
    })?;
    let point = match (req.longitude, req.latitude) {
        (Some(lon), Some(lat)) => GeoPoint::new(lon, lat),
        _ => {
            return Err(EngineError::Validation(
                "longitude and latitude are required".to_string(),
            ))
        }
    };
    if !point.is_valid() {
        return Err(EngineError::Validation(
            "coordinates are out of range".to_string(),
        ));
    }
    let address = req
        .address
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty());
    Ok(ValidatedIssue {
        title,
        description,
        category,
        location: IssueLocation { point, address },
        images: req.images,
    })
}

/// Issue lifecycle engine.
pub struct IssueEngine {
    store: Arc<dyn IssueStore>,
    audit: Arc<dyn AuditStore>,
    images: Arc<dyn ImageStore>,
    clock: Arc<dyn Clock>,
    sla: SlaTable,
    duplicates: DuplicateDetector,
    transitions: TransitionManager,
    consensus: ConsensusEngine,
    /// Serializes the duplicate check with the insert it guards.
    intake_lock: tokio::sync::Mutex<()>,
}

impl IssueEngine {
    pub fn new(
        store: Arc<dyn IssueStore>,
        audit: Arc<dyn AuditStore>,
        images: Arc<dyn ImageStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            audit,
            images,
            clock,
            sla: SlaTable::default(),
            duplicates: DuplicateDetector::default(),
            transitions: TransitionManager::default(),
            consensus: ConsensusEngine::default(),
            intake_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_sla_table(mut self, sla: SlaTable) -> Self {
        self.sla = sla;
        self
    }

    pub fn with_duplicate_detector(mut self, duplicates: DuplicateDetector) -> Self {
        self.duplicates = duplicates;
        self
    }

    pub fn with_transition_policy(mut self, policy: TransitionPolicy) -> Self {
        self.transitions = TransitionManager::new(policy);
        self.consensus = ConsensusEngine::new(self.consensus.rules(), self.transitions.clone());
        self
    }

    pub fn with_consensus_rules(mut self, rules: ConsensusRules) -> Self {
        self.consensus = ConsensusEngine::new(rules, self.transitions.clone());
        self
    }

    pub fn store(&self) -> Arc<dyn IssueStore> {
        Arc::clone(&self.store)
    }

    pub fn audit(&self) -> Arc<dyn AuditStore> {
        Arc::clone(&self.audit)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Issue by id, hidden (not found) outside the caller's village.
    async fn visible_issue(&self, actor: &Actor, issue_id: &str) -> Result<Issue, EngineError> {
        match self.store.get(issue_id).await? {
            Some(issue) if issue.village == actor.village => Ok(issue),
            _ => Err(EngineError::NotFound(format!("issue {}", issue_id))),
        }
    }

    async fn release_images(&self, images: &[ImageRef]) {
        for image in images {
            if let Err(e) = self.images.delete(&image.handle).await {
                tracing::warn!(handle = %image.handle, error = %e, "failed to release staged image");
            }
        }
    }

    /// Validate, run the duplicate gate, then persist with a computed SLA deadline.
    pub async fn create_issue(
        &self,
        reporter: &Actor,
        req: CreateIssueRequest,
    ) -> Result<Issue, EngineError> {
        let valid = validate(reporter, req)?;

        let _intake = self.intake_lock.lock().await;
        let duplicate = self
            .duplicates
            .find_duplicate(
                self.store.as_ref(),
                &reporter.village,
                valid.category,
                valid.location.point,
            )
            .await?;
        if let Some(existing) = duplicate {
            self.release_images(&valid.images).await;
            tracing::info!(
                duplicate_id = %existing.id,
                category = %valid.category,
                released_images = valid.images.len(),
                "intake rejected as duplicate"
            );
            return Err(EngineError::Duplicate {
                duplicate_id: existing.id,
                suggestion: UPVOTE_SUGGESTION.to_string(),
            });
        }

        let now = self.clock.now();
        let issue = Issue {
            id: Uuid::new_v4().to_string(),
            reporter_id: reporter.id.clone(),
            village: reporter.village.clone(),
            title: valid.title,
            description: valid.description,
            category: valid.category,
            images: valid.images,
            location: valid.location,
            status: IssueStatus::Submitted,
            sla_deadline: self.sla.deadline_for(valid.category, now),
            is_red_flagged: false,
            assigned_authority: None,
            upvotes: BTreeSet::new(),
            verification_votes: VerificationVotes::default(),
            comment_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(issue.clone()).await?;
        tracing::info!(
            issue_id = %issue.id,
            village = %issue.village,
            category = %issue.category,
            sla_deadline = %issue.sla_deadline,
            "issue created"
        );
        Ok(issue)
    }

    /// Issues in the caller's village, newest first.
    pub async fn list_issues(
        &self,
        actor: &Actor,
        filters: &ListIssuesRequest,
    ) -> Result<Vec<Issue>, EngineError> {
        let status = match filters.status.as_deref() {
            Some(s) => Some(IssueStatus::parse(s).ok_or_else(|| {
                EngineError::Validation(format!("unknown status filter '{}'", s))
            })?),
            None => None,
        };
        let category = match filters.category.as_deref() {
            Some(c) => Some(Category::parse(c).ok_or_else(|| {
                EngineError::Validation(format!("unknown category filter '{}'", c))
            })?),
            None => None,
        };
        let query = IssueQuery {
            village: actor.village.clone(),
            status,
            category,
        };
        Ok(self.store.list(&query).await?)
    }

    pub async fn get_issue(&self, actor: &Actor, issue_id: &str) -> Result<Issue, EngineError> {
        self.visible_issue(actor, issue_id).await
    }

    /// Add the caller's upvote, or remove it if already present.
    pub async fn toggle_upvote(
        &self,
        actor: &Actor,
        issue_id: &str,
    ) -> Result<UpvoteOutcome, EngineError> {
        self.visible_issue(actor, issue_id).await?;
        let user = actor.id.clone();
        let update = self
            .store
            .update(
                issue_id,
                self.clock.now(),
                Box::new(move |issue: &mut Issue| {
                    if !issue.upvotes.remove(&user) {
                        issue.upvotes.insert(user);
                    }
                    Ok(())
                }),
            )
            .await?;
        Ok(UpvoteOutcome {
            upvoted: update.after.upvotes.contains(&actor.id),
            upvotes: update.after.upvote_count(),
        })
    }

    /// Manual status change by an authority or admin.
    pub async fn set_status(
        &self,
        actor: &Actor,
        issue_id: &str,
        new_status: &str,
    ) -> Result<Issue, EngineError> {
        self.transitions.authorize(actor)?;
        let to = TransitionManager::parse_status(new_status)?;
        self.visible_issue(actor, issue_id).await?;
        let transitions = &self.transitions;
        let journal = AuditJournal {
            audit: self.audit.as_ref(),
            entries: Box::new(|update: &IssueUpdate| {
                vec![transitions.status_entry(update, actor, None)]
            }),
        };
        let update = self
            .store
            .update_journaled(
                issue_id,
                self.clock.now(),
                Box::new(|issue: &mut Issue| transitions.apply(issue, actor, to)),
                journal,
            )
            .await?;
        transitions.log_change(&update, actor);
        Ok(update.after)
    }

    /// Verification vote on a resolved issue; may auto-transition it.
    pub async fn cast_verification_vote(
        &self,
        actor: &Actor,
        issue_id: &str,
        vote: VerificationVote,
    ) -> Result<VoteOutcome, EngineError> {
        self.visible_issue(actor, issue_id).await?;
        self.consensus
            .cast_vote(
                self.store.as_ref(),
                self.audit.as_ref(),
                issue_id,
                actor,
                vote,
                self.clock.now(),
            )
            .await
    }

    /// Audit entries for an issue, newest first.
    pub async fn list_history(
        &self,
        actor: &Actor,
        issue_id: &str,
    ) -> Result<Vec<AuditLogEntry>, EngineError> {
        self.visible_issue(actor, issue_id).await?;
        Ok(self.audit.list_for_issue(issue_id).await?)
    }

    /// Bump the comment counter after the comment store saved a comment.
    pub async fn record_comment(&self, actor: &Actor, issue_id: &str) -> Result<u64, EngineError> {
        self.visible_issue(actor, issue_id).await?;
        let update = self
            .store
            .update(
                issue_id,
                self.clock.now(),
                Box::new(|issue: &mut Issue| {
                    issue.comment_count += 1;
                    Ok(())
                }),
            )
            .await?;
        Ok(update.after.comment_count)
    }

    /// Dashboard numbers for the caller's village; authorities and admins only.
    pub async fn analytics(&self, actor: &Actor) -> Result<VillageAnalytics, EngineError> {
        if !actor.role.is_privileged() {
            return Err(EngineError::Permission(
                "analytics are limited to authorities and admins".to_string(),
            ));
        }
        let issues = self
            .store
            .list(&IssueQuery {
                village: actor.village.clone(),
                ..Default::default()
            })
            .await?;
        Ok(analytics::summarize(&issues))
    }
}
