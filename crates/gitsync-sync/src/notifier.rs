//! Notification delivery
//!
//! Pipeline and coordinator tasks emit notifications from wherever they
//! run. A single consumer task forwards them to the
//! [`INotificationService`], so delivery order is emission order.

use std::sync::Arc;

use async_trait::async_trait;
use gitsync_core::ports::{INotificationService, Notification, NotificationPriority, SyncEvent};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

enum Dispatch {
    Deliver(Notification),
    Flush(oneshot::Sender<()>),
}

/// Cloneable sender side of the notification queue
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::UnboundedSender<Dispatch>,
    show_sync_messages: bool,
}

impl NotificationDispatcher {
    /// Starts the consumer task delivering to `service`
    ///
    /// With `show_sync_messages` off, informational events (pull started,
    /// sync complete, ...) are dropped; failures are always delivered.
    pub fn spawn(service: Arc<dyn INotificationService>, show_sync_messages: bool) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Dispatch>();

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    Dispatch::Deliver(notification) => {
                        if let Err(e) = service.notify(&notification).await {
                            warn!(
                                event = %notification.event,
                                error = %e,
                                "Failed to deliver notification"
                            );
                        }
                    }
                    Dispatch::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            debug!("Notification dispatcher stopped");
        });

        Self {
            tx,
            show_sync_messages,
        }
    }

    /// Queues a notification for delivery
    pub fn notify(&self, notification: Notification) {
        if notification.event.is_informational() && !self.show_sync_messages {
            debug!(event = %notification.event, "Sync message suppressed");
            return;
        }
        if self.tx.send(Dispatch::Deliver(notification)).is_err() {
            warn!("Notification dispatcher is gone");
        }
    }

    pub fn event(&self, event: SyncEvent) {
        self.notify(Notification::new(event));
    }

    /// Resolves once every notification queued before this call was delivered
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Dispatch::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

/// Notification adapter that writes every event to the log
///
/// Headless hosts (the daemon without a desktop session, the CLI) use this
/// so user-facing events are never lost.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl INotificationService for TracingNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        let event = notification.event.name();
        let body = notification.body();
        match notification.priority {
            NotificationPriority::High => error!(event, "{}", body),
            NotificationPriority::Normal => info!(event, "{}", body),
            NotificationPriority::Low => debug!(event, "{}", body),
        }
        Ok(())
    }
}
