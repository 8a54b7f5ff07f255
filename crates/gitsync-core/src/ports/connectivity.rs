//! Connectivity port (driven/secondary port)
//!
//! The coordinator asks this port before starting a run. When it answers
//! `false` the request is handed to the reconnect retry scheduler instead
//! of being executed.

/// Port trait for network reachability checks
#[async_trait::async_trait]
pub trait IConnectivity: Send + Sync {
    /// Returns whether the remote can currently be reached
    ///
    /// Implementations must answer within a bounded time and treat any
    /// probe failure as `false`.
    async fn is_network_available(&self) -> bool;
}

/// Connectivity that is always available
///
/// Used for local-path remotes and for hosts that have no way to probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

#[async_trait::async_trait]
impl IConnectivity for AlwaysOnline {
    async fn is_network_available(&self) -> bool {
        true
    }
}
