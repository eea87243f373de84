//! Audit and identity types: AuditLogEntry, AuditAction, Actor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Actor id used for consensus-driven transitions.
pub const SYSTEM_CONSENSUS: &str = "system:consensus";
/// Actor id used for SLA breach entries.
pub const SYSTEM_SLA_MONITOR: &str = "system:sla-monitor";

/// Role as supplied by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Citizen,
    Authority,
    Admin,
    /// Automation identity; never supplied by the identity provider.
    System,
}

impl UserRole {
    /// Parse an identity-provider role. `villager` is an alias of `citizen`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "citizen" | "villager" => Some(UserRole::Citizen),
            "authority" => Some(UserRole::Authority),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Citizen => "citizen",
            UserRole::Authority => "authority",
            UserRole::Admin => "admin",
            UserRole::System => "system",
        }
    }

    /// May change issue status by hand and read analytics.
    pub fn is_privileged(self) -> bool {
        matches!(self, UserRole::Authority | UserRole::Admin)
    }
}

/// Verified caller identity: `{id, role, village}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: UserRole,
    pub village: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: UserRole, village: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            village: village.into(),
        }
    }

    /// Automation actor; village is irrelevant for system actions.
    pub fn system(id: &str) -> Self {
        Self {
            id: id.to_string(),
            role: UserRole::System,
            village: String::new(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == UserRole::System
    }
}

/// Kind of status-affecting event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    StatusChange,
    SlaBreach,
    PriorityChange,
    Assignment,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::StatusChange => "STATUS_CHANGE",
            AuditAction::SlaBreach => "SLA_BREACH",
            AuditAction::PriorityChange => "PRIORITY_CHANGE",
            AuditAction::Assignment => "ASSIGNMENT",
        }
    }
}

/// One immutable audit trail entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub entry_id: String,
    pub issue_id: String,
    /// Acting user, or a `system:*` id for automatic actions.
    pub actor_id: String,
    pub action: AuditAction,
    pub details: String,
    /// Human user whose action caused an automatic entry (e.g. the deciding voter).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        issue_id: &str,
        actor_id: &str,
        action: AuditAction,
        details: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            issue_id: issue_id.to_string(),
            actor_id: actor_id.to_string(),
            action,
            details: details.into(),
            triggered_by: None,
            created_at,
        }
    }

    pub fn triggered_by(mut self, user_id: &str) -> Self {
        self.triggered_by = Some(user_id.to_string());
        self
    }
}
