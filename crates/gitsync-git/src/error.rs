//! libgit2 error classification
//!
//! The pipeline branches on [`VcsError`] variants, so every `git2::Error`
//! leaving this crate goes through [`classify`]. Classification uses the
//! error code first and the error class second.

use git2::{ErrorClass, ErrorCode};
use gitsync_core::ports::VcsError;

/// Maps a libgit2 error onto the port's error classes
pub fn classify(err: git2::Error) -> VcsError {
    let message = err.message().to_string();

    match err.code() {
        ErrorCode::Auth | ErrorCode::Certificate => return VcsError::Authentication(message),
        ErrorCode::Conflict | ErrorCode::MergeConflict => {
            return VcsError::CheckoutConflict(message)
        }
        ErrorCode::Uncommitted | ErrorCode::IndexDirty | ErrorCode::Modified => {
            return VcsError::DirtyWorktree(message)
        }
        ErrorCode::InvalidSpec => return VcsError::InvalidRemote(message),
        ErrorCode::NotFound | ErrorCode::UnbornBranch => return VcsError::NotFound(message),
        _ => {}
    }

    match err.class() {
        ErrorClass::NoMemory => VcsError::OutOfMemory(message),
        // libgit2 reports unknown URL schemes as a generic net error
        ErrorClass::Net if message.contains("unsupported URL protocol") => {
            VcsError::InvalidRemote(message)
        }
        ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssh | ErrorClass::Ssl => {
            VcsError::Transport(message)
        }
        ErrorClass::Checkout | ErrorClass::Merge => VcsError::CheckoutConflict(message),
        _ => VcsError::Generic(message),
    }
}

/// Whether a push error means the remote refused a non-fast-forward update
pub(crate) fn is_non_fast_forward(err: &git2::Error) -> bool {
    if err.code() == ErrorCode::NotFastForward {
        return true;
    }
    let lower = err.message().to_lowercase();
    lower.contains("non-fast-forward")
        || lower.contains("non-fastforwardable")
        || lower.contains("fetch first")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(code: ErrorCode, class: ErrorClass, message: &str) -> git2::Error {
        git2::Error::new(code, class, message)
    }

    #[test]
    fn test_classify_by_code() {
        assert!(matches!(
            classify(error(ErrorCode::Auth, ErrorClass::Http, "401")),
            VcsError::Authentication(_)
        ));
        assert!(matches!(
            classify(error(ErrorCode::Conflict, ErrorClass::Checkout, "1 conflict prevents checkout")),
            VcsError::CheckoutConflict(_)
        ));
        assert!(matches!(
            classify(error(ErrorCode::Uncommitted, ErrorClass::Merge, "dirty")),
            VcsError::DirtyWorktree(_)
        ));
        assert!(matches!(
            classify(error(ErrorCode::NotFound, ErrorClass::Reference, "no such ref")),
            VcsError::NotFound(_)
        ));
    }

    #[test]
    fn test_classify_by_class() {
        let transport = classify(error(
            ErrorCode::GenericError,
            ErrorClass::Net,
            "failed to connect to example.com: Connection refused",
        ));
        assert!(transport.is_network());

        assert!(matches!(
            classify(error(
                ErrorCode::GenericError,
                ErrorClass::Net,
                "unsupported URL protocol"
            )),
            VcsError::InvalidRemote(_)
        ));
        assert!(matches!(
            classify(error(ErrorCode::GenericError, ErrorClass::NoMemory, "oom")),
            VcsError::OutOfMemory(_)
        ));
        assert!(matches!(
            classify(error(ErrorCode::GenericError, ErrorClass::Odb, "corrupt")),
            VcsError::Generic(_)
        ));
    }

    #[test]
    fn test_non_fast_forward_detection() {
        assert!(is_non_fast_forward(&error(
            ErrorCode::NotFastForward,
            ErrorClass::Reference,
            "cannot push"
        )));
        assert!(is_non_fast_forward(&error(
            ErrorCode::GenericError,
            ErrorClass::Net,
            "cannot push non-fastforwardable reference"
        )));
        assert!(!is_non_fast_forward(&error(
            ErrorCode::GenericError,
            ErrorClass::Net,
            "connection reset"
        )));
    }
}
