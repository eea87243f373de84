//! Issue lifecycle engine: intake with duplicate detection, SLA deadlines,
//! role-gated status transitions, verification consensus, and audit entries.

pub mod analytics;
pub mod consensus;
pub mod duplicate;
mod engine;
mod images;
pub mod sla;
pub mod transition;

#[cfg(test)]
mod test_support;

pub use civic_types::EngineError;
pub use consensus::{ConsensusEngine, ConsensusRules, REOPEN_THRESHOLD, VERIFY_THRESHOLD};
pub use duplicate::{DuplicateDetector, DUPLICATE_RADIUS_M, UPVOTE_SUGGESTION};
pub use engine::{IssueEngine, MAX_TITLE_CHARS};
pub use images::{HttpImageStore, LoggingImageStore};
#[cfg(any(test, feature = "test-util"))]
pub use images::RecordingImageStore;
pub use sla::{SlaTable, DEFAULT_BUDGET_HOURS};
pub use transition::{TransitionManager, TransitionPolicy};
