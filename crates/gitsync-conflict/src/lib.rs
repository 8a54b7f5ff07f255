//! gitsync Conflict - Conflict marker extraction and manual resolution
//!
//! Provides:
//! - Line-oriented extraction of conflict blocks from a merged file
//! - A per-file resolution model (local, remote, or both)
//! - A merge session that steps through every conflicted file

pub mod error;
pub mod extractor;
pub mod model;
pub mod session;

pub use error::ConflictError;
pub use extractor::ConflictExtractor;
pub use model::{BlockSides, ConflictResolutionModel};
pub use session::{MergeSession, SaveOutcome};
