//! Status transitions: role check, transition table, authority assignment, audit entry.

use civic_types::{
    Actor, AuditAction, AuditLogEntry, EngineError, Issue, IssueStatus, IssueUpdate,
};

/// Which manual status changes are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Any status may follow any other, including itself.
    #[default]
    Permissive,
    /// Only the moves listed in [`strict_successors`].
    Strict,
}

impl TransitionPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Some(TransitionPolicy::Permissive),
            "strict" => Some(TransitionPolicy::Strict),
            _ => None,
        }
    }

    pub fn allows(self, from: IssueStatus, to: IssueStatus) -> bool {
        match self {
            TransitionPolicy::Permissive => true,
            TransitionPolicy::Strict => strict_successors(from).contains(&to),
        }
    }
}

/// Legal next states under [`TransitionPolicy::Strict`]. `Verified` is terminal.
pub fn strict_successors(from: IssueStatus) -> &'static [IssueStatus] {
    use IssueStatus::*;
    match from {
        Submitted => &[UnderReview, InProgress, Resolved],
        UnderReview => &[InProgress, Resolved],
        InProgress => &[UnderReview, Resolved],
        Resolved => &[InProgress, Reopened, Verified],
        Reopened => &[UnderReview, InProgress, Resolved],
        Verified => &[],
    }
}

/// Applies status changes to an issue inside an atomic store update and
/// builds the audit entries journaled with it.
#[derive(Debug, Clone, Default)]
pub struct TransitionManager {
    policy: TransitionPolicy,
}

impl TransitionManager {
    pub fn new(policy: TransitionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// Only authorities and admins change status by hand; the system actor is always allowed.
    pub fn authorize(&self, actor: &Actor) -> Result<(), EngineError> {
        if actor.is_system() || actor.role.is_privileged() {
            Ok(())
        } else {
            Err(EngineError::Permission(format!(
                "role '{}' may not change issue status",
                actor.role.as_str()
            )))
        }
    }

    /// Parse one of the six status names.
    pub fn parse_status(raw: &str) -> Result<IssueStatus, EngineError> {
        IssueStatus::parse(raw).ok_or_else(|| {
            EngineError::InvalidStatus(format!("'{}' is not a valid status", raw))
        })
    }

    /// Move `issue` to `to`. Runs inside a store mutation; `Err` aborts the update.
    ///
    /// The first move to `In Progress` by a human actor makes that actor the
    /// assigned authority. Verification ballots are never cleared.
    pub fn apply(&self, issue: &mut Issue, actor: &Actor, to: IssueStatus) -> Result<(), String> {
        let from = issue.status;
        if !self.policy.allows(from, to) {
            return Err(format!(
                "transition from '{}' to '{}' is not allowed",
                from, to
            ));
        }
        issue.status = to;
        if to == IssueStatus::InProgress && issue.assigned_authority.is_none() && !actor.is_system()
        {
            issue.assigned_authority = Some(actor.id.clone());
        }
        Ok(())
    }

    /// The STATUS_CHANGE entry for `update`, stamped with its new `updated_at`.
    /// Without `details` the entry describes the move and any new assignment.
    pub fn status_entry(
        &self,
        update: &IssueUpdate,
        actor: &Actor,
        details: Option<String>,
    ) -> AuditLogEntry {
        let details = details.unwrap_or_else(|| status_change_details(update));
        AuditLogEntry::new(
            &update.after.id,
            &actor.id,
            AuditAction::StatusChange,
            details,
            update.after.updated_at,
        )
    }

    pub fn log_change(&self, update: &IssueUpdate, actor: &Actor) {
        tracing::info!(
            issue_id = %update.after.id,
            actor = %actor.id,
            from = %update.before.status,
            to = %update.after.status,
            "issue status changed"
        );
    }
}

fn status_change_details(update: &IssueUpdate) -> String {
    let mut details = format!(
        "Changed status from '{}' to '{}'",
        update.before.status, update.after.status
    );
    if update.before.assigned_authority.is_none() {
        if let Some(ref authority) = update.after.assigned_authority {
            details.push_str(&format!("; assigned to {}", authority));
        }
    }
    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_issue;
    use civic_types::{UserRole, VerificationVote, SYSTEM_CONSENSUS};

    #[test]
    fn citizens_are_rejected() {
        let tm = TransitionManager::default();
        let citizen = Actor::new("c1", UserRole::Citizen, "v1");
        assert!(matches!(
            tm.authorize(&citizen),
            Err(EngineError::Permission(_))
        ));
        assert!(tm
            .authorize(&Actor::new("a1", UserRole::Authority, "v1"))
            .is_ok());
        assert!(tm.authorize(&Actor::new("a2", UserRole::Admin, "v1")).is_ok());
        assert!(tm.authorize(&Actor::system(SYSTEM_CONSENSUS)).is_ok());
    }

    #[test]
    fn unknown_status_is_invalid() {
        assert!(matches!(
            TransitionManager::parse_status("Closed"),
            Err(EngineError::InvalidStatus(_))
        ));
        assert_eq!(
            TransitionManager::parse_status("Under Review").unwrap(),
            IssueStatus::UnderReview
        );
    }

    #[test]
    fn first_in_progress_assigns_and_sticks() {
        let tm = TransitionManager::default();
        let mut issue = sample_issue();
        let a1 = Actor::new("auth-1", UserRole::Authority, "v1");
        let a2 = Actor::new("auth-2", UserRole::Authority, "v1");

        tm.apply(&mut issue, &a1, IssueStatus::InProgress).unwrap();
        assert_eq!(issue.assigned_authority.as_deref(), Some("auth-1"));

        tm.apply(&mut issue, &a2, IssueStatus::UnderReview).unwrap();
        tm.apply(&mut issue, &a2, IssueStatus::InProgress).unwrap();
        assert_eq!(issue.assigned_authority.as_deref(), Some("auth-1"));
    }

    #[test]
    fn permissive_allows_any_move() {
        let tm = TransitionManager::default();
        let mut issue = sample_issue();
        let admin = Actor::new("admin", UserRole::Admin, "v1");
        issue.status = IssueStatus::Verified;
        tm.apply(&mut issue, &admin, IssueStatus::Submitted).unwrap();
        assert_eq!(issue.status, IssueStatus::Submitted);
    }

    #[test]
    fn strict_rejects_moves_outside_table() {
        let tm = TransitionManager::new(TransitionPolicy::Strict);
        let mut issue = sample_issue();
        let admin = Actor::new("admin", UserRole::Admin, "v1");
        issue.status = IssueStatus::Verified;
        assert!(tm.apply(&mut issue, &admin, IssueStatus::Submitted).is_err());
        assert_eq!(issue.status, IssueStatus::Verified);

        issue.status = IssueStatus::Resolved;
        tm.apply(&mut issue, &admin, IssueStatus::Reopened).unwrap();
        assert_eq!(issue.status, IssueStatus::Reopened);
    }

    #[test]
    fn strict_table_keeps_consensus_moves_open() {
        for to in [IssueStatus::Verified, IssueStatus::Reopened] {
            assert!(TransitionPolicy::Strict.allows(IssueStatus::Resolved, to));
        }
    }

    #[test]
    fn re_resolving_keeps_earlier_ballots() {
        let tm = TransitionManager::default();
        let admin = Actor::new("admin", UserRole::Admin, "v1");
        let mut issue = sample_issue();
        issue.status = IssueStatus::Reopened;
        issue.verification_votes.cast("c1", VerificationVote::Reopen);

        tm.apply(&mut issue, &admin, IssueStatus::Resolved).unwrap();
        assert_eq!(issue.verification_votes.reopen_count(), 1);
    }

    #[test]
    fn status_entry_describes_move_and_assignment() {
        let tm = TransitionManager::default();
        let a1 = Actor::new("auth-1", UserRole::Authority, "v1");
        let before = sample_issue();
        let mut after = before.clone();
        tm.apply(&mut after, &a1, IssueStatus::InProgress).unwrap();
        let update = IssueUpdate { before, after };

        let entry = tm.status_entry(&update, &a1, None);
        assert_eq!(entry.action, AuditAction::StatusChange);
        assert_eq!(entry.actor_id, "auth-1");
        assert_eq!(entry.created_at, update.after.updated_at);
        assert_eq!(
            entry.details,
            "Changed status from 'Submitted' to 'In Progress'; assigned to auth-1"
        );
        assert!(entry.triggered_by.is_none());
    }
}
