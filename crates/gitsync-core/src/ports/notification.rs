//! Notification service port (driven/secondary port)
//!
//! This module defines the interface for surfacing sync progress and
//! failures to the user. Implementations may log, print to a terminal,
//! or forward to a desktop notification daemon.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because notification delivery is adapter-specific.
//! - Notifications are fire-and-forget; the caller does not wait for
//!   user interaction.
//! - Each notification is a discrete named event plus an optional
//!   human-readable detail string, nothing more.

use serde::{Deserialize, Serialize};

// ============================================================================
// NotificationPriority
// ============================================================================

/// Priority level for a notification
///
/// Maps to urgency levels in notification systems (e.g., libnotify urgency).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    /// Low priority, may not be shown immediately
    Low,
    /// Normal priority, shown in the notification area
    #[default]
    Normal,
    /// High priority, may trigger a banner or sound
    High,
}

impl std::fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationPriority::Low => "low",
            NotificationPriority::Normal => "normal",
            NotificationPriority::High => "high",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// SyncEvent
// ============================================================================

/// Named events produced by the sync orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncEvent {
    PullStarted,
    PushStarted,
    ResolvingMerge,
    SyncComplete,
    SyncNotRequired,
    MergeComplete,
    CheckoutConflictDetected,
    OngoingMergeConflict,
    RepositoryNotFound,
    SyncFailed,
}

impl SyncEvent {
    /// Kebab-case event name, stable for scripting
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::PullStarted => "pull-started",
            SyncEvent::PushStarted => "push-started",
            SyncEvent::ResolvingMerge => "resolving-merge",
            SyncEvent::SyncComplete => "sync-complete",
            SyncEvent::SyncNotRequired => "sync-not-required",
            SyncEvent::MergeComplete => "merge-complete",
            SyncEvent::CheckoutConflictDetected => "checkout-conflict-detected",
            SyncEvent::OngoingMergeConflict => "ongoing-merge-conflict",
            SyncEvent::RepositoryNotFound => "repository-not-found",
            SyncEvent::SyncFailed => "sync-failed",
        }
    }

    /// Default text shown to the user
    pub fn message(&self) -> &'static str {
        match self {
            SyncEvent::PullStarted => "Pulling changes...",
            SyncEvent::PushStarted => "Pushing changes...",
            SyncEvent::ResolvingMerge => "Resolving merge...",
            SyncEvent::SyncComplete => "Sync complete",
            SyncEvent::SyncNotRequired => "Sync not required",
            SyncEvent::MergeComplete => "Merge complete",
            SyncEvent::CheckoutConflictDetected => {
                "Local and remote changes could not be merged; resolve the conflicts to continue"
            }
            SyncEvent::OngoingMergeConflict => {
                "A merge conflict is in progress; resolve it before syncing again"
            }
            SyncEvent::RepositoryNotFound => "Repository not found",
            SyncEvent::SyncFailed => "Sync failed",
        }
    }

    /// Progress and completion events, as opposed to problems
    ///
    /// Informational events can be silenced by configuration; the rest
    /// are always delivered.
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            SyncEvent::PullStarted
                | SyncEvent::PushStarted
                | SyncEvent::ResolvingMerge
                | SyncEvent::SyncComplete
                | SyncEvent::SyncNotRequired
                | SyncEvent::MergeComplete
        )
    }

    pub fn priority(&self) -> NotificationPriority {
        match self {
            SyncEvent::PullStarted | SyncEvent::PushStarted | SyncEvent::ResolvingMerge => {
                NotificationPriority::Low
            }
            SyncEvent::SyncComplete | SyncEvent::SyncNotRequired | SyncEvent::MergeComplete => {
                NotificationPriority::Normal
            }
            _ => NotificationPriority::High,
        }
    }
}

impl std::fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Notification
// ============================================================================

/// A notification to display to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Which event occurred
    pub event: SyncEvent,
    /// Extra context, e.g. the failure reason
    pub detail: Option<String>,
    /// Priority level affecting how the notification is displayed
    pub priority: NotificationPriority,
}

impl Notification {
    /// Creates a notification for `event` with its default priority
    pub fn new(event: SyncEvent) -> Self {
        Self {
            event,
            detail: None,
            priority: event.priority(),
        }
    }

    /// Attaches a detail string
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Full user-facing text: the event message plus detail, if any
    pub fn body(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{}: {}", self.event.message(), detail),
            None => self.event.message().to_string(),
        }
    }
}

// ============================================================================
// INotificationService trait
// ============================================================================

/// Port trait for user-facing notifications
///
/// Implementations should gracefully handle delivery failures (e.g., a
/// missing notification daemon) without crashing; callers log and move on.
#[async_trait::async_trait]
pub trait INotificationService: Send + Sync {
    /// Delivers a notification to the user
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}
