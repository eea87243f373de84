//! Request and response DTOs for the issue API.

use crate::{Category, ImageRef, Issue, IssueStatus};
use serde::{Deserialize, Serialize};

/// Create-issue request. Reporter identity comes from the caller, not the body.
///
/// Required fields are optional here so that missing ones surface as a
/// validation error from the engine rather than a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateIssueRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub address: Option<String>,
    /// Images already uploaded to the image store for this submission.
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

/// Listing filters (query string).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListIssuesRequest {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStatusRequest {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub vote: String,
}

/// Result of a verification vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub status: IssueStatus,
    pub verified_count: usize,
    pub reopen_count: usize,
}

/// Result of an upvote toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpvoteOutcome {
    /// True when the call added the caller's upvote, false when it removed it.
    pub upvoted: bool,
    pub upvotes: usize,
}

/// Payload returned when intake finds an existing nearby issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateRejection {
    pub duplicate_id: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub total_issues: usize,
    pub resolved_issues: usize,
    pub pending_issues: usize,
    pub red_flagged_issues: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: Category,
    pub count: usize,
}

/// Per-village dashboard numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VillageAnalytics {
    pub summary: AnalyticsSummary,
    pub by_category: Vec<CategoryCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentCount {
    pub comment_count: u64,
}

/// Base response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseResponse<T> {
    #[serde(default = "default_code")]
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<T>,
}

fn default_code() -> i32 {
    200
}

impl<T> BaseResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            code: 200,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

pub type IssueResponse = BaseResponse<Issue>;
pub type IssueListResponse = BaseResponse<Vec<Issue>>;
