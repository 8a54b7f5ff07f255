//! gitsync Git - libgit2 adapter for the version control port
//!
//! Provides:
//! - [`Git2Backend`] - `IVersionControl` over a local working tree
//! - [`TcpConnectivityProbe`] - `IConnectivity` that dials the remote host
//!
//! ## Modules
//!
//! - [`backend`] - Repository operations (fetch, pull, push, commit, rebase, ...)
//! - [`connectivity`] - Remote URL parsing and reachability probing
//! - [`credentials`] - Credential callbacks built from the auth configuration
//! - [`error`] - Classification of libgit2 errors into port errors
//!
//! libgit2 is blocking; every operation runs on the blocking thread pool
//! and reopens the repository there, so the backend itself stays `Send + Sync`.

pub mod backend;
pub mod connectivity;
pub mod credentials;
pub mod error;

pub use backend::{Git2Backend, DEFAULT_NETWORK_TIMEOUT};
pub use connectivity::{RemoteEndpoint, TcpConnectivityProbe};
pub use error::classify;
