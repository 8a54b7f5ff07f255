//! Repository lock artifact handling
//!
//! libgit2 and the git CLI both create `.git/index.lock` while they mutate
//! the index. Nothing may be uploaded or downloaded while it exists.

use std::time::Duration;

use gitsync_core::domain::RepositoryHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::SyncError;

/// Polls until the lock artifact is gone
///
/// Returns how long the wait took. Fails with [`SyncError::LockTimeout`]
/// once `timeout` has elapsed with the lock still present.
pub async fn wait_for_lock_release(
    repository: &RepositoryHandle,
    poll: Duration,
    timeout: Duration,
) -> Result<Duration, SyncError> {
    let started = Instant::now();
    if !repository.is_locked() {
        return Ok(Duration::ZERO);
    }

    debug!(lock = %repository.lock_file().display(), "Waiting for repository lock");
    while repository.is_locked() {
        let waited = started.elapsed();
        if waited >= timeout {
            warn!(
                lock = %repository.lock_file().display(),
                waited_secs = waited.as_secs(),
                "Repository lock did not clear"
            );
            return Err(SyncError::LockTimeout {
                path: repository.lock_file(),
                waited_secs: waited.as_secs(),
            });
        }
        tokio::time::sleep(poll).await;
    }

    let waited = started.elapsed();
    debug!(waited_ms = waited.as_millis() as u64, "Repository lock released");
    Ok(waited)
}
