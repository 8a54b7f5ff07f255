//! Reconnect-triggered sync retries
//!
//! When a request arrives while offline, the coordinator hands it to the
//! [`NetworkRetryScheduler`] instead of running it. The scheduler keeps at
//! most one background task probing connectivity; once the network is back
//! it submits a forced sync and exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gitsync_core::ports::IConnectivity;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coordinator::SyncHandle;

/// Idempotent scheduler for the single pending reconnect retry
#[derive(Clone)]
pub struct NetworkRetryScheduler {
    handle: SyncHandle,
    connectivity: Arc<dyn IConnectivity>,
    interval: Duration,
    shutdown: CancellationToken,
    scheduled: Arc<AtomicBool>,
}

impl NetworkRetryScheduler {
    pub fn new(
        handle: SyncHandle,
        connectivity: Arc<dyn IConnectivity>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            handle,
            connectivity,
            interval,
            shutdown,
            scheduled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a retry task is currently waiting for connectivity
    pub fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::Acquire)
    }

    /// Arranges a forced sync once connectivity returns
    ///
    /// Returns `false` when a retry was already pending; no second task is
    /// started in that case.
    pub fn schedule(&self) -> bool {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            debug!("Network retry already scheduled");
            return false;
        }

        info!(interval_secs = self.interval.as_secs(), "Scheduling sync on reconnect");
        let this = self.clone();
        tokio::spawn(async move {
            this.wait_and_fire().await;
        });
        true
    }

    async fn wait_and_fire(self) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("Network retry cancelled");
                    self.scheduled.store(false, Ordering::Release);
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {
                    if !self.connectivity.is_network_available().await {
                        continue;
                    }
                    // Cleared first so a retry that fails again can reschedule.
                    self.scheduled.store(false, Ordering::Release);
                    info!("Network available again, requesting sync");
                    if let Err(e) = self.handle.request_sync(true) {
                        warn!(error = %e, "Could not submit reconnect sync");
                    }
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::SyncRequest;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct FlakyNetwork {
        offline_probes: AtomicUsize,
    }

    #[async_trait]
    impl IConnectivity for FlakyNetwork {
        async fn is_network_available(&self) -> bool {
            self.offline_probes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_err()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_one_forced_sync_after_reconnect() {
        let (handle, mut rx) = SyncHandle::channel();
        let network = Arc::new(FlakyNetwork {
            offline_probes: AtomicUsize::new(2),
        });
        let scheduler = NetworkRetryScheduler::new(
            handle,
            network,
            Duration::from_secs(15),
            CancellationToken::new(),
        );

        assert!(scheduler.schedule());
        assert!(!scheduler.schedule());
        assert!(scheduler.is_scheduled());

        let request = rx.recv().await.unwrap();
        assert_eq!(request, SyncRequest::Sync { forced: true });
        assert!(!scheduler.is_scheduled());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_the_task() {
        let (handle, mut rx) = SyncHandle::channel();
        let network = Arc::new(FlakyNetwork {
            offline_probes: AtomicUsize::new(usize::MAX),
        });
        let token = CancellationToken::new();
        let scheduler =
            NetworkRetryScheduler::new(handle, network, Duration::from_secs(1), token.clone());

        scheduler.schedule();
        tokio::time::sleep(Duration::from_secs(3)).await;
        token.cancel();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(!scheduler.is_scheduled());
        assert!(rx.try_recv().is_err());
    }
}
