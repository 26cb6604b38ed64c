//! Host notification capability.
//!
//! The host owns the permission state. The scheduler only reads it; the
//! explicit notification toggle is the one place that may prompt.

use std::sync::Mutex;

use async_trait::async_trait;
use sadaqah_protocol::ReminderItem;
use tracing::info;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPermission {
    Granted,
    Denied,
    /// Never asked.
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderNotification {
    pub title: String,
    pub body: String,
    /// Dedup key of the reminder this notification announces.
    pub tag: String,
}

impl ReminderNotification {
    pub fn for_item(item: &ReminderItem, tag: String) -> Self {
        let body = match item.expires_at() {
            Some(at) => format!(
                "{} minutes left before your reservation expires at {} UTC.",
                item.minutes_left,
                at.format("%H:%M")
            ),
            None => format!(
                "{} minutes left before your reservation expires.",
                item.minutes_left
            ),
        };
        Self {
            title: format!("Reminder: read juz {}", item.juz_number),
            body,
            tag,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// `None` when the host cannot show notifications at all.
    fn permission(&self) -> Option<NotificationPermission>;

    /// Prompts the user. Only called from an explicit toggle.
    async fn request_permission(&self) -> NotificationPermission;

    fn notify(&self, notification: &ReminderNotification) -> Result<()>;
}

/// Headless notifier: "shows" reminders as log lines.
pub struct LogNotifier {
    permission: Mutex<NotificationPermission>,
}

impl LogNotifier {
    pub fn new(permission: NotificationPermission) -> Self {
        Self {
            permission: Mutex::new(permission),
        }
    }

    fn current(&self) -> NotificationPermission {
        match self.permission.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new(NotificationPermission::Default)
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn permission(&self) -> Option<NotificationPermission> {
        Some(self.current())
    }

    async fn request_permission(&self) -> NotificationPermission {
        // A terminal has nobody to ask; treat the explicit toggle as consent
        // unless the user already refused.
        let mut guard = match self.permission.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *guard == NotificationPermission::Default {
            *guard = NotificationPermission::Granted;
        }
        *guard
    }

    fn notify(&self, notification: &ReminderNotification) -> Result<()> {
        info!(
            tag = %notification.tag,
            title = %notification.title,
            body = %notification.body,
            "Reading reminder"
        );
        Ok(())
    }
}
