use std::sync::Arc;
use tracing::{debug, error};

use super::models::Notification;
use super::senders::NotificationSender;

/// Fire-and-log delivery front for the cycle and the command surface.
#[derive(Clone)]
pub struct NotificationService {
    sender: Arc<dyn NotificationSender>,
}

impl NotificationService {
    pub fn new(sender: Arc<dyn NotificationSender>) -> Self {
        Self { sender }
    }

    /// Sends `notification`. Delivery failures are logged, never returned.
    pub async fn dispatch(&self, notification: Notification) -> bool {
        match self.sender.send(&notification).await {
            Ok(()) => {
                debug!(severity = ?notification.severity, "Notification delivered.");
                true
            }
            Err(e) => {
                error!(severity = ?notification.severity, error = %e, "Failed to deliver notification.");
                false
            }
        }
    }
}
