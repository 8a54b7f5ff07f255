//! Error types for the conflict engine

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while extracting or resolving conflicts
#[derive(Debug, Error)]
pub enum ConflictError {
    /// Reading or writing a conflicted file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The segment at this position is a plain line or out of range
    #[error("no conflict block at position {0}")]
    NotAConflictBlock(usize),

    /// The file is not part of the current merge session
    #[error("file is not in conflict: {0}")]
    UnknownFile(PathBuf),

    /// Every conflicted file has already been resolved
    #[error("no conflicted files remain")]
    NoFilesRemaining,
}

impl ConflictError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConflictError::Io {
            path: path.into(),
            source,
        }
    }
}
