//! Verification consensus: community votes on resolved issues.

use crate::transition::TransitionManager;
use chrono::{DateTime, Utc};
use civic_types::{
    Actor, AuditJournal, AuditLogEntry, AuditStore, EngineError, Issue, IssueStatus, IssueStore, IssueUpdate,
    VerificationVote, VerificationVotes, VoteOutcome, SYSTEM_CONSENSUS,
};

pub const REOPEN_THRESHOLD: usize = 3;
pub const VERIFY_THRESHOLD: usize = 5;

/// Vote counts that trigger an automatic transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsensusRules {
    pub reopen_threshold: usize,
    pub verify_threshold: usize,
}

impl Default for ConsensusRules {
    fn default() -> Self {
        Self {
            reopen_threshold: REOPEN_THRESHOLD,
            verify_threshold: VERIFY_THRESHOLD,
        }
    }
}

impl ConsensusRules {
    /// Status the votes call for. Reopen is checked first and wins a tie.
    pub fn decide(&self, votes: &VerificationVotes) -> Option<IssueStatus> {
        if votes.reopen_count() >= self.reopen_threshold {
            Some(IssueStatus::Reopened)
        } else if votes.verified_count() >= self.verify_threshold {
            Some(IssueStatus::Verified)
        } else {
            None
        }
    }
}

/// Records votes and fires the automatic transition inside the same atomic
/// issue update, so two votes crossing a threshold together transition once.
/// The transition's audit entry is journaled with that update.
#[derive(Debug, Clone, Default)]
pub struct ConsensusEngine {
    rules: ConsensusRules,
    transitions: TransitionManager,
}

impl ConsensusEngine {
    /// Automatic transitions go through `transitions`, so they obey its policy.
    pub fn new(rules: ConsensusRules, transitions: TransitionManager) -> Self {
        Self { rules, transitions }
    }

    pub fn rules(&self) -> ConsensusRules {
        self.rules
    }

    /// Cast `voter`'s vote on a resolved issue.
    pub async fn cast_vote(
        &self,
        store: &dyn IssueStore,
        audit: &dyn AuditStore,
        issue_id: &str,
        voter: &Actor,
        vote: VerificationVote,
        now: DateTime<Utc>,
    ) -> Result<VoteOutcome, EngineError> {
        let system = Actor::system(SYSTEM_CONSENSUS);
        let rules = self.rules;
        let transitions = &self.transitions;
        let voter_id = voter.id.clone();
        let journal = AuditJournal {
            audit,
            entries: Box::new(|update: &IssueUpdate| {
                consensus_entry(transitions, update, &system, &voter.id)
                    .into_iter()
                    .collect::<Vec<_>>()
            }),
        };
        let update = store
            .update_journaled(
                issue_id,
                now,
                Box::new(|issue: &mut Issue| {
                    if issue.status != IssueStatus::Resolved {
                        return Err(format!(
                            "only resolved issues can be verified (status is '{}')",
                            issue.status
                        ));
                    }
                    issue.verification_votes.cast(&voter_id, vote);
                    match rules.decide(&issue.verification_votes) {
                        Some(IssueStatus::Reopened) => {
                            transitions.apply(issue, &system, IssueStatus::Reopened)?;
                            issue.is_red_flagged = true;
                        }
                        Some(next) => transitions.apply(issue, &system, next)?,
                        None => {}
                    }
                    Ok(())
                }),
                journal,
            )
            .await?;

        let after = &update.after;
        if after.status != update.before.status {
            transitions.log_change(&update, &system);
        }

        Ok(VoteOutcome {
            status: after.status,
            verified_count: after.verification_votes.verified_count(),
            reopen_count: after.verification_votes.reopen_count(),
        })
    }
}

/// The automatic STATUS_CHANGE entry, if the vote moved the issue.
fn consensus_entry(
    transitions: &TransitionManager,
    update: &IssueUpdate,
    system: &Actor,
    voter_id: &str,
) -> Option<AuditLogEntry> {
    let after = &update.after;
    let details = match after.status {
        status if status == update.before.status => return None,
        IssueStatus::Reopened => format!(
            "System auto-reopened issue after {} reopen votes; last vote by {}",
            after.verification_votes.reopen_count(),
            voter_id
        ),
        _ => format!(
            "Issue verified by community consensus after {} votes; last vote by {}",
            after.verification_votes.verified_count(),
            voter_id
        ),
    };
    Some(
        transitions
            .status_entry(update, system, Some(details))
            .triggered_by(voter_id),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn votes(verified: usize, reopen: usize) -> VerificationVotes {
        let mut v = VerificationVotes::default();
        for i in 0..verified {
            v.cast(&format!("v{}", i), VerificationVote::Verified);
        }
        for i in 0..reopen {
            v.cast(&format!("r{}", i), VerificationVote::Reopen);
        }
        v
    }

    #[test]
    fn thresholds() {
        let rules = ConsensusRules::default();
        assert_eq!(rules.decide(&votes(4, 2)), None);
        assert_eq!(rules.decide(&votes(5, 2)), Some(IssueStatus::Verified));
        assert_eq!(rules.decide(&votes(0, 3)), Some(IssueStatus::Reopened));
    }

    #[test]
    fn reopen_wins_when_both_cross() {
        let rules = ConsensusRules {
            reopen_threshold: 1,
            verify_threshold: 1,
        };
        assert_eq!(rules.decide(&votes(1, 1)), Some(IssueStatus::Reopened));
        assert_eq!(
            ConsensusRules::default().decide(&votes(5, 3)),
            Some(IssueStatus::Reopened)
        );
    }
}
