//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including repository validation failures and invalid state transitions.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The directory does not exist or cannot be read
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The directory exists but carries no version-control metadata
    #[error("Not a git working tree: {0}")]
    NotARepository(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },
}
