//! CLI command implementations

pub mod completions;
pub mod config;
pub mod conflicts;
pub mod discard;
pub mod log;
pub mod merge;
pub mod status;
pub mod sync;
