mod common;

use std::path::PathBuf;

use common::Fixture;
use gitsync_core::domain::SyncOutcome;
use gitsync_core::ports::{
    Author, MergeResult, RebaseResult, RefUpdateStatus, RepositoryState, SyncEvent, VcsError,
};
use gitsync_sync::{SyncError, MAX_REBASE_ATTEMPTS};

#[tokio::test]
async fn test_nothing_to_do_is_silent() {
    let fx = Fixture::new();

    let report = fx.pipeline.run(false).await.unwrap();

    assert_eq!(report.download, SyncOutcome::NotRequired);
    assert_eq!(report.upload, SyncOutcome::NotRequired);
    assert_eq!(fx.backend.count("pull"), 0);
    assert_eq!(fx.backend.count("commit"), 0);
    assert!(fx.events().await.is_empty());
}

#[tokio::test]
async fn test_forced_noop_reports_not_required() {
    let fx = Fixture::new();

    fx.pipeline.run(true).await.unwrap();

    assert_eq!(fx.events().await, vec![SyncEvent::SyncNotRequired]);
}

#[tokio::test]
async fn test_local_changes_are_committed_and_pushed() {
    let fx = Fixture::new();
    fx.backend.local_changes(&["notes/today.md"]);

    let report = fx.pipeline.run(false).await.unwrap();

    assert_eq!(report.download, SyncOutcome::NotRequired);
    assert_eq!(report.upload, SyncOutcome::Performed);
    assert_eq!(
        fx.backend.calls(),
        vec!["fetch", "status", "stage", "commit", "push"]
    );
    assert_eq!(*fx.backend.staged.lock().unwrap(), vec![None]);
    assert_eq!(
        fx.events().await,
        vec![SyncEvent::PushStarted, SyncEvent::SyncComplete]
    );

    let (_, message) = fx.backend.last_commit().unwrap();
    assert!(message.starts_with("Last Sync: "));
}

#[tokio::test]
async fn test_both_phases_announce_once() {
    let fx = Fixture::new();
    fx.backend.remote_ahead();
    fx.backend.local_changes(&["a.txt"]);

    let report = fx.pipeline.run(false).await.unwrap();

    assert_eq!(report.outcome(), SyncOutcome::Performed);
    assert_eq!(
        fx.events().await,
        vec![SyncEvent::PullStarted, SyncEvent::SyncComplete]
    );
}

#[tokio::test]
async fn test_already_up_to_date_merge_is_not_required() {
    let fx = Fixture::new();
    fx.backend.remote_ahead();
    fx.backend
        .pulls
        .lock()
        .unwrap()
        .push_back(Ok(MergeResult::AlreadyUpToDate));

    let report = fx.pipeline.run(false).await.unwrap();

    assert_eq!(report.download, SyncOutcome::NotRequired);
    assert_eq!(fx.backend.count("pull"), 1);
}

#[tokio::test]
async fn test_dirty_worktree_stops_before_upload() {
    let fx = Fixture::new();
    fx.backend.remote_ahead();
    fx.backend
        .pulls
        .lock()
        .unwrap()
        .push_back(Ok(MergeResult::DirtyWorktree(vec![PathBuf::from("a.txt")])));

    let err = fx.pipeline.run(false).await.unwrap_err();

    assert!(matches!(err, SyncError::DirtyWorktreeConflict(_)));
    assert!(err.is_conflict());
    assert_eq!(fx.backend.count("push"), 0);
}

#[tokio::test]
async fn test_conflicting_merge_is_checkout_conflict() {
    let fx = Fixture::new();
    fx.backend.remote_ahead();
    fx.backend
        .pulls
        .lock()
        .unwrap()
        .push_back(Ok(MergeResult::Conflicting(vec![PathBuf::from("b.txt")])));

    let err = fx.pipeline.run(false).await.unwrap_err();
    assert!(matches!(err, SyncError::CheckoutConflict(ref m) if m.contains("b.txt")));
}

#[tokio::test]
async fn test_fetch_transport_error_is_network() {
    let fx = Fixture::new();
    fx.backend
        .fetches
        .lock()
        .unwrap()
        .push_back(Err(VcsError::Transport("connection refused".into())));

    let err = fx.pipeline.run(false).await.unwrap_err();
    assert!(err.is_network());
}

#[tokio::test]
async fn test_rejected_push_rebases_once_then_succeeds() {
    let fx = Fixture::new();
    fx.backend.local_changes(&["a.txt"]);
    fx.backend.push_result(RefUpdateStatus::RejectedNonFastForward);

    let report = fx.pipeline.run(false).await.unwrap();

    assert_eq!(report.upload, SyncOutcome::Performed);
    assert_eq!(fx.backend.count("rebase"), 1);
    assert_eq!(fx.backend.count("push"), 2);
    assert_eq!(fx.backend.count("rebase_abort"), 0);
}

#[tokio::test]
async fn test_failed_rebase_falls_back_to_download() {
    let fx = Fixture::new();
    fx.backend.local_changes(&["a.txt"]);
    fx.backend.push_result(RefUpdateStatus::RejectedNonFastForward);
    fx.backend
        .rebases
        .lock()
        .unwrap()
        .push_back(RebaseResult::Conflicts(vec![PathBuf::from("a.txt")]));
    // first fetch: heads match; second (after failed rebase): remote ahead
    fx.backend.fetches.lock().unwrap().push_back(Ok(Default::default()));
    fx.backend.remote_ahead();

    fx.pipeline.run(false).await.unwrap();

    assert_eq!(
        fx.backend.calls(),
        vec![
            "fetch",
            "status",
            "stage",
            "commit",
            "push",
            "rebase",
            "rebase_abort",
            "fetch",
            "pull",
            "push"
        ]
    );
}

#[tokio::test]
async fn test_repeated_rejection_is_fatal() {
    let fx = Fixture::new();
    fx.backend.local_changes(&["a.txt"]);
    for _ in 0..=MAX_REBASE_ATTEMPTS {
        fx.backend.push_result(RefUpdateStatus::RejectedNonFastForward);
    }

    let err = fx.pipeline.run(false).await.unwrap_err();

    assert!(matches!(err, SyncError::NonFastForwardRejected(_)));
    assert_eq!(fx.backend.count("rebase"), MAX_REBASE_ATTEMPTS as usize);
}

#[tokio::test]
async fn test_failed_download_after_failed_rebase_escalates() {
    let fx = Fixture::new();
    fx.backend.local_changes(&["a.txt"]);
    fx.backend.push_result(RefUpdateStatus::RejectedNonFastForward);
    fx.backend
        .rebases
        .lock()
        .unwrap()
        .push_back(RebaseResult::Failed("unclean".into()));
    fx.backend.fetches.lock().unwrap().push_back(Ok(Default::default()));
    fx.backend
        .fetches
        .lock()
        .unwrap()
        .push_back(Err(VcsError::Authentication("expired token".into())));

    let err = fx.pipeline.run(false).await.unwrap_err();

    assert!(matches!(err, SyncError::AuthenticationFailed(_)));
    assert_eq!(fx.backend.count("push"), 1);
}

#[tokio::test]
async fn test_stale_merge_is_aborted_before_rebase() {
    let fx = Fixture::new();
    fx.backend.push_result(RefUpdateStatus::RejectedNonFastForward);
    *fx.backend.state.lock().unwrap() = RepositoryState::Merging;

    fx.pipeline.run(false).await.unwrap();

    let calls = fx.backend.calls();
    let abort = calls.iter().position(|c| c == "merge_abort").unwrap();
    let rebase = calls.iter().position(|c| c == "rebase").unwrap();
    assert!(abort < rebase);
}

#[tokio::test]
async fn test_other_rejections_are_not_retried() {
    let fx = Fixture::new();
    fx.backend
        .push_result(RefUpdateStatus::RejectedOtherReason(Some("pre-receive hook declined".into())));

    let err = fx.pipeline.run(false).await.unwrap_err();

    assert!(matches!(err, SyncError::OtherRejected(Some(ref r)) if r.contains("hook")));
    assert_eq!(fx.backend.count("rebase"), 0);
}

#[tokio::test]
async fn test_missing_upstream_fails_recovery() {
    let fx = Fixture::new();
    fx.backend.push_result(RefUpdateStatus::RejectedNonFastForward);
    *fx.backend.upstream.lock().unwrap() = None;

    let err = fx.pipeline.run(false).await.unwrap_err();
    assert!(matches!(err, SyncError::Unexpected(_)));
}

#[tokio::test]
async fn test_author_precedence() {
    // explicit settings win
    let fx = Fixture::with_settings(|s| {
        s.commit.author_name = Some("Explicit".into());
        s.commit.author_email = Some("explicit@example.com".into());
        s.auth_username = Some("token-user".into());
    });
    fx.backend.local_changes(&["a.txt"]);
    fx.pipeline.run(false).await.unwrap();
    assert_eq!(
        fx.backend.last_commit().unwrap().0,
        Author::new("Explicit", "explicit@example.com")
    );

    // then repository config
    let fx = Fixture::with_settings(|s| s.auth_username = Some("token-user".into()));
    fx.backend.local_changes(&["a.txt"]);
    fx.pipeline.run(false).await.unwrap();
    assert_eq!(
        fx.backend.last_commit().unwrap().0,
        Author::new("Repo User", "repo@example.com")
    );

    // then the authenticated username
    let fx = Fixture::with_settings(|s| s.auth_username = Some("token-user".into()));
    *fx.backend.configured_author.lock().unwrap() = None;
    fx.backend.local_changes(&["a.txt"]);
    fx.pipeline.run(false).await.unwrap();
    assert_eq!(fx.backend.last_commit().unwrap().0, Author::new("token-user", ""));
}

#[tokio::test]
async fn test_manual_sync_stages_only_listed_paths() {
    let fx = Fixture::new();
    fx.backend.local_changes(&["a.txt", "b.txt"]);

    let report = fx
        .pipeline
        .run_manual(vec![PathBuf::from("b.txt")], "Only b".into())
        .await
        .unwrap();

    assert_eq!(report.upload, SyncOutcome::Performed);
    assert_eq!(fx.backend.count("fetch"), 0);
    assert_eq!(
        *fx.backend.staged.lock().unwrap(),
        vec![Some(vec![PathBuf::from("b.txt")])]
    );
    assert_eq!(fx.backend.last_commit().unwrap().1, "Only b");
}

#[tokio::test]
async fn test_merge_completion_commits_without_changes() {
    let fx = Fixture::new();
    *fx.backend.state.lock().unwrap() = RepositoryState::Merging;

    let report = fx.pipeline.run_merge(None).await.unwrap();

    assert_eq!(report.upload, SyncOutcome::Performed);
    assert_eq!(fx.backend.count("commit"), 1);
    assert_eq!(
        fx.events().await,
        vec![SyncEvent::ResolvingMerge, SyncEvent::MergeComplete]
    );
}

#[tokio::test]
async fn test_lock_that_never_clears_fails_the_run() {
    let fx = Fixture::new();
    std::fs::write(fx.dir.path().join(".git/index.lock"), b"").unwrap();

    let err = fx.pipeline.run(false).await.unwrap_err();
    assert!(matches!(err, SyncError::LockTimeout { .. }));
    assert_eq!(fx.backend.count("push"), 0);
}

#[tokio::test]
async fn test_missing_repository_is_reported() {
    let fx = Fixture::new();
    std::fs::remove_dir_all(fx.dir.path().join(".git")).unwrap();

    let err = fx.pipeline.run(true).await.unwrap_err();
    assert!(matches!(err, SyncError::RepositoryNotFound(_)));
    assert_eq!(err.user_event(), SyncEvent::RepositoryNotFound);

    let err = fx
        .pipeline
        .run_manual(vec![PathBuf::from("a.md")], "notes".into())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::RepositoryNotFound(_)));
    assert!(matches!(
        fx.pipeline.run_merge(None).await,
        Err(SyncError::RepositoryNotFound(_))
    ));

    assert!(fx.backend.calls().is_empty());
    assert!(fx.events().await.is_empty());
}
