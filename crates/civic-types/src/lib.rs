//! Core types and traits for the civic issue lifecycle engine.
//!
//! The `Issue` entity, the audit trail entry, request/response DTOs, and the
//! storage and collaborator traits the engine is written against.

mod audit;
mod clock;
mod dto;
mod issue;
mod traits;

pub use audit::*;
pub use clock::SystemClock;
#[cfg(feature = "test-util")]
pub use clock::ManualClock;
pub use dto::*;
pub use issue::*;
pub use traits::*;
