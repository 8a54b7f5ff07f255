//! Domain entities and business logic
//!
//! This module contains the core domain types for gitsync:
//! - Coordinator scheduling state and per-phase sync outcomes
//! - Validated repository handles
//! - Conflict segments and resolution choices
//! - Domain-specific error types

pub mod conflict;
pub mod errors;
pub mod repository;
pub mod sync_state;

// Re-export commonly used types
pub use conflict::{ConflictSegment, ResolutionChoice};
pub use errors::DomainError;
pub use repository::RepositoryHandle;
pub use sync_state::{CompletionDecision, RequestDecision, SyncOutcome, SyncState};
