//! User-visible notifications
//!
//! Recoverable failures (rollbacks, failed page loads) end up here instead
//! of bubbling to the rendering layer.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationLevel::Info => "info",
            NotificationLevel::Error => "error",
        }
    }
}

/// Non-blocking toast raised by the core
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Broadcast channel of notifications
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to notifications raised from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn info(&self, message: impl Into<String>) {
        self.send(NotificationLevel::Info, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(message = %message, "Raising error notification");
        self.send(NotificationLevel::Error, message);
    }

    fn send(&self, level: NotificationLevel, message: String) {
        crate::metrics::NOTIFICATIONS_TOTAL
            .with_label_values(&[level.as_str()])
            .inc();

        let notification = Notification {
            level,
            message,
            at: Utc::now(),
        };
        if self.tx.send(notification).is_err() {
            tracing::trace!("no subscribers for notification");
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}
