//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IVersionControl`] - Repository operations (libgit2 adapter in `gitsync-git`)
//! - [`INotificationService`] - User-facing sync events
//! - [`IConnectivity`] - Network reachability of the remote

pub mod connectivity;
pub mod notification;
pub mod version_control;

pub use connectivity::{AlwaysOnline, IConnectivity};
pub use notification::{INotificationService, Notification, NotificationPriority, SyncEvent};
pub use version_control::{
    Author, CommitSummary, FetchResult, IVersionControl, MergeResult, RebaseResult,
    RefUpdateStatus, RemoteRefUpdate, RepoStatus, RepositoryState, VcsError,
};
