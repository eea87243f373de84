//! Issue entity and its value types: category, status, location, votes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Fixed set of issue categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Water,
    Electricity,
    Roads,
    Sanitation,
    Health,
    Education,
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Water,
        Category::Electricity,
        Category::Roads,
        Category::Sanitation,
        Category::Health,
        Category::Education,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Water => "Water",
            Category::Electricity => "Electricity",
            Category::Roads => "Roads",
            Category::Sanitation => "Sanitation",
            Category::Health => "Health",
            Category::Education => "Education",
            Category::Other => "Other",
        }
    }

    /// Parse the canonical name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IssueStatus {
    #[default]
    Submitted,
    #[serde(rename = "Under Review")]
    UnderReview,
    #[serde(rename = "In Progress")]
    InProgress,
    Resolved,
    Verified,
    Reopened,
}

impl IssueStatus {
    pub const ALL: [IssueStatus; 6] = [
        IssueStatus::Submitted,
        IssueStatus::UnderReview,
        IssueStatus::InProgress,
        IssueStatus::Resolved,
        IssueStatus::Verified,
        IssueStatus::Reopened,
    ];

    /// Statuses that count as open work: SLA applies and duplicates are suppressed.
    pub const ACTIVE: [IssueStatus; 3] = [
        IssueStatus::Submitted,
        IssueStatus::UnderReview,
        IssueStatus::InProgress,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IssueStatus::Submitted => "Submitted",
            IssueStatus::UnderReview => "Under Review",
            IssueStatus::InProgress => "In Progress",
            IssueStatus::Resolved => "Resolved",
            IssueStatus::Verified => "Verified",
            IssueStatus::Reopened => "Reopened",
        }
    }

    /// Exact match against the six display names.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// WGS84 point, longitude first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.longitude.is_finite()
            && self.latitude.is_finite()
            && (-180.0..=180.0).contains(&self.longitude)
            && (-90.0..=90.0).contains(&self.latitude)
    }
}

/// Where the issue is; fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueLocation {
    pub point: GeoPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Uploaded image held by the external image store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    /// Handle accepted by the image store's delete call.
    pub handle: String,
}

/// Community verdict on a resolved issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationVote {
    Verified,
    Reopen,
}

impl VerificationVote {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verified" => Some(VerificationVote::Verified),
            "reopen" => Some(VerificationVote::Reopen),
            _ => None,
        }
    }
}

/// Verification ballots. A user sits in at most one of the two sets; the only
/// way in is [`VerificationVotes::cast`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationVotes {
    verified: BTreeSet<String>,
    reopen: BTreeSet<String>,
}

impl VerificationVotes {
    /// Record `user`'s vote, replacing any earlier vote from the same user.
    pub fn cast(&mut self, user_id: &str, vote: VerificationVote) {
        self.verified.remove(user_id);
        self.reopen.remove(user_id);
        match vote {
            VerificationVote::Verified => self.verified.insert(user_id.to_string()),
            VerificationVote::Reopen => self.reopen.insert(user_id.to_string()),
        };
    }

    pub fn verified_count(&self) -> usize {
        self.verified.len()
    }

    pub fn reopen_count(&self) -> usize {
        self.reopen.len()
    }

    pub fn verified(&self) -> &BTreeSet<String> {
        &self.verified
    }

    pub fn reopen(&self) -> &BTreeSet<String> {
        &self.reopen
    }

    pub fn vote_of(&self, user_id: &str) -> Option<VerificationVote> {
        if self.verified.contains(user_id) {
            Some(VerificationVote::Verified)
        } else if self.reopen.contains(user_id) {
            Some(VerificationVote::Reopen)
        } else {
            None
        }
    }

    /// True when no user is in both sets (always, unless deserialized from bad data).
    pub fn is_consistent(&self) -> bool {
        self.verified.is_disjoint(&self.reopen)
    }
}

/// A reported civic issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub reporter_id: String,
    pub village: String,
    pub title: String,
    pub description: String,
    pub category: Category,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    pub location: IssueLocation,
    #[serde(default)]
    pub status: IssueStatus,
    pub sla_deadline: DateTime<Utc>,
    #[serde(default)]
    pub is_red_flagged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_authority: Option<String>,
    #[serde(default)]
    pub upvotes: BTreeSet<String>,
    #[serde(default)]
    pub verification_votes: VerificationVotes,
    #[serde(default)]
    pub comment_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Issue {
    pub fn upvote_count(&self) -> usize {
        self.upvotes.len()
    }

    /// Checks that `self` is a legal successor of `before`.
    ///
    /// Identity, location, SLA deadline and creation time never change; the red
    /// flag is never cleared; an assigned authority is never replaced.
    pub fn check_successor_of(&self, before: &Issue) -> Result<(), String> {
        if self.id != before.id
            || self.reporter_id != before.reporter_id
            || self.village != before.village
            || self.location != before.location
            || self.sla_deadline != before.sla_deadline
            || self.created_at != before.created_at
        {
            return Err(format!("immutable field changed on issue {}", before.id));
        }
        if before.is_red_flagged && !self.is_red_flagged {
            return Err(format!("red flag cleared on issue {}", before.id));
        }
        if let Some(ref prev) = before.assigned_authority {
            if self.assigned_authority.as_ref() != Some(prev) {
                return Err(format!("assigned authority replaced on issue {}", before.id));
            }
        }
        if !self.verification_votes.is_consistent() {
            return Err(format!("conflicting verification votes on issue {}", before.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_issue() -> Issue {
        let now = Utc::now();
        Issue {
            id: "i1".to_string(),
            reporter_id: "u1".to_string(),
            village: "v1".to_string(),
            title: "Pothole".to_string(),
            description: "Deep pothole near the school".to_string(),
            category: Category::Roads,
            images: Vec::new(),
            location: IssueLocation {
                point: GeoPoint::new(79.08, 21.14),
                address: None,
            },
            status: IssueStatus::Submitted,
            sla_deadline: now,
            is_red_flagged: false,
            assigned_authority: None,
            upvotes: BTreeSet::new(),
            verification_votes: VerificationVotes::default(),
            comment_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn status_names_round_trip_through_serde() {
        let json = serde_json::to_string(&IssueStatus::UnderReview).unwrap();
        assert_eq!(json, "\"Under Review\"");
        let back: IssueStatus = serde_json::from_str("\"In Progress\"").unwrap();
        assert_eq!(back, IssueStatus::InProgress);
        assert_eq!(IssueStatus::parse("Closed"), None);
        assert_eq!(IssueStatus::parse("Reopened"), Some(IssueStatus::Reopened));
    }

    #[test]
    fn category_parse_is_case_insensitive() {
        assert_eq!(Category::parse("roads"), Some(Category::Roads));
        assert_eq!(Category::parse(" Water "), Some(Category::Water));
        assert_eq!(Category::parse("Traffic"), None);
    }

    #[test]
    fn changing_a_vote_moves_the_user_between_sets() {
        let mut votes = VerificationVotes::default();
        votes.cast("a", VerificationVote::Verified);
        votes.cast("b", VerificationVote::Reopen);
        votes.cast("a", VerificationVote::Reopen);
        assert_eq!(votes.verified_count(), 0);
        assert_eq!(votes.reopen_count(), 2);
        assert_eq!(votes.vote_of("a"), Some(VerificationVote::Reopen));
        assert!(votes.is_consistent());

        votes.cast("a", VerificationVote::Reopen);
        assert_eq!(votes.reopen_count(), 2);
    }

    #[test]
    fn successor_check_rejects_clearing_red_flag() {
        let mut before = sample_issue();
        before.is_red_flagged = true;
        let mut after = before.clone();
        after.is_red_flagged = false;
        assert!(after.check_successor_of(&before).is_err());
    }

    #[test]
    fn successor_check_rejects_reassignment() {
        let mut before = sample_issue();
        before.assigned_authority = Some("auth-1".to_string());
        let mut after = before.clone();
        after.assigned_authority = Some("auth-2".to_string());
        assert!(after.check_successor_of(&before).is_err());

        let mut ok = before.clone();
        ok.status = IssueStatus::Resolved;
        assert!(ok.check_successor_of(&before).is_ok());
    }

    #[test]
    fn successor_check_rejects_moved_location() {
        let before = sample_issue();
        let mut after = before.clone();
        after.location.point = GeoPoint::new(0.0, 0.0);
        assert!(after.check_successor_of(&before).is_err());
    }
}
