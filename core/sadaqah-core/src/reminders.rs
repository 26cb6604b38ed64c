//! Reading-reminder notifications.
//!
//! A check fetches the participant's reminder list, publishes it into the
//! profile snapshot, and, when notifications are enabled and permitted,
//! raises one notification per due-soon reservation that was never notified
//! before. The notified set lives in the flag store so it survives restarts,
//! toggles and identity switches.
//!
//! Nothing on this path surfaces an error: a failed fetch or a failed
//! notification is logged and the next tick tries again.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use sadaqah_protocol::{Juz, ReminderItem};
use tokio::sync::{watch, Mutex};
use tokio::task::{spawn_blocking, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{LiveError, Result};
use crate::flags::{
    read_bool, read_json, write_bool, write_json, FlagStore, NOTIFICATIONS_ENABLED_KEY,
    NOTIFIED_REMINDERS_KEY,
};
use crate::notify::{NotificationPermission, Notifier, ReminderNotification};
use crate::sync::SyncCoordinator;

/// Persisted dedup map: reminder key → already notified.
pub type NotifiedMap = BTreeMap<String, bool>;

/// Window before expiry in which a reservation counts as due soon.
pub fn due_soon_window() -> TimeDelta {
    TimeDelta::hours(1)
}

/// `"{cycle}-{unit}-{expires_at}"`. The raw expiry string is used as sent by
/// the server, so a renewed reservation gets a fresh key.
pub fn dedup_key(item: &ReminderItem) -> String {
    format!(
        "{}-{}-{}",
        item.khatma_number, item.juz_number, item.reservation_expires_at
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRecord {
    pub unit_id: u32,
    pub reserved_by: String,
    pub reservation_expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ReservationRecord {
    /// `None` for units without a holder or an expiry.
    pub fn from_juz(juz: &Juz) -> Option<Self> {
        Some(Self {
            unit_id: juz.juz_number,
            reserved_by: juz.reserved_by.as_deref()?.trim().to_string(),
            reservation_expires_at: juz.reservation_expires_at?,
            completed_at: juz.completed_at,
        })
    }

    pub fn is_due_soon(&self, now: DateTime<Utc>) -> bool {
        self.completed_at.is_none()
            && now < self.reservation_expires_at
            && self.reservation_expires_at - now <= due_soon_window()
    }

    pub fn minutes_left(&self, now: DateTime<Utc>) -> i64 {
        (self.reservation_expires_at - now).num_minutes().max(0)
    }
}

pub struct ReminderScheduler {
    coordinator: Arc<SyncCoordinator>,
    notifier: Arc<dyn Notifier>,
    flags: Arc<dyn FlagStore>,
    enabled: watch::Sender<bool>,
    interval: Duration,
    // Serialises read-notify-write of the dedup map across overlapping checks.
    check_lock: Mutex<()>,
}

impl ReminderScheduler {
    pub fn new(
        coordinator: Arc<SyncCoordinator>,
        notifier: Arc<dyn Notifier>,
        flags: Arc<dyn FlagStore>,
        interval: Duration,
    ) -> Self {
        let initial = read_bool(flags.as_ref(), NOTIFICATIONS_ENABLED_KEY, false);
        let (enabled, _) = watch::channel(initial);
        Self {
            coordinator,
            notifier,
            flags,
            enabled,
            interval,
            check_lock: Mutex::new(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled.borrow()
    }

    pub fn notified(&self) -> NotifiedMap {
        read_json(self.flags.as_ref(), NOTIFIED_REMINDERS_KEY).unwrap_or_default()
    }

    fn may_notify(&self) -> bool {
        self.is_enabled() && self.notifier.permission() == Some(NotificationPermission::Granted)
    }

    /// Runs one reminder check for `name` and returns how many notifications
    /// were raised.
    pub async fn check_and_notify(&self, name: &str) -> usize {
        let name = name.trim();
        if name.is_empty() || !self.coordinator.is_active() {
            return 0;
        }
        let _guard = self.check_lock.lock().await;

        let list = match self.coordinator.backend().reminders(name).await {
            Ok(list) => list,
            Err(err) => {
                debug!(error = %err, name, "Reminder fetch failed");
                return 0;
            }
        };
        if !self.coordinator.is_active() {
            return 0;
        }
        self.coordinator.publish_reminders(name, list.clone());

        if !self.may_notify() {
            return 0;
        }

        let mut notified = self.notified();
        let mut raised = 0;
        for item in list.items.iter().filter(|item| item.due_soon) {
            let key = dedup_key(item);
            if notified.get(&key).copied().unwrap_or(false) {
                continue;
            }
            let notification = ReminderNotification::for_item(item, key.clone());
            match self.notifier.notify(&notification) {
                Ok(()) => {
                    notified.insert(key, true);
                    raised += 1;
                }
                Err(err) => warn!(error = %err, key = %key, "Reminder notification failed"),
            }
        }

        if raised > 0 {
            // File-backed stores write and rename synchronously.
            let flags = Arc::clone(&self.flags);
            let written = spawn_blocking(move || {
                write_json(flags.as_ref(), NOTIFIED_REMINDERS_KEY, &notified)
            })
            .await;
            if let Err(err) = written {
                warn!(error = %err, "Reminder dedup write did not complete");
            }
            info!(name, raised, "Reading reminders sent");
        }
        raised
    }

    /// Flips the notification preference. Turning off only clears the flag;
    /// the notified set is kept. Turning on needs host support and granted
    /// permission, then checks right away for `name`.
    pub async fn toggle_notifications(&self, name: &str) -> Result<bool> {
        if self.is_enabled() {
            self.set_enabled(false);
            return Ok(false);
        }

        if self.notifier.permission().is_none() {
            return Err(LiveError::NotificationsUnsupported);
        }
        if self.notifier.request_permission().await != NotificationPermission::Granted {
            return Err(LiveError::NotificationPermissionDenied);
        }

        self.set_enabled(true);
        self.check_and_notify(name).await;
        Ok(true)
    }

    fn set_enabled(&self, enabled: bool) {
        write_bool(self.flags.as_ref(), NOTIFICATIONS_ENABLED_KEY, enabled);
        self.enabled.send_replace(enabled);
        info!(enabled, "Reading reminders toggled");
    }

    /// Drives periodic checks for the settled identity in `identity`. The
    /// first check after enabling or switching identity runs immediately.
    pub fn spawn(self: &Arc<Self>, mut identity: watch::Receiver<String>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        let mut enabled = self.enabled.subscribe();
        tokio::spawn(async move {
            loop {
                let name = identity.borrow_and_update().trim().to_string();
                let on = *enabled.borrow_and_update();

                if on && !name.is_empty() {
                    let mut ticker = interval(scheduler.interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        tokio::select! {
                            _ = ticker.tick() => {
                                scheduler.check_and_notify(&name).await;
                            }
                            changed = identity.changed() => {
                                if changed.is_err() {
                                    return;
                                }
                                break;
                            }
                            changed = enabled.changed() => {
                                if changed.is_err() {
                                    return;
                                }
                                break;
                            }
                        }
                    }
                } else {
                    tokio::select! {
                        changed = identity.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                        changed = enabled.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(expires_in_minutes: i64, completed: bool) -> (ReservationRecord, DateTime<Utc>) {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let record = ReservationRecord {
            unit_id: 4,
            reserved_by: "Aisha".to_string(),
            reservation_expires_at: now + TimeDelta::minutes(expires_in_minutes),
            completed_at: completed.then_some(now),
        };
        (record, now)
    }

    #[test]
    fn dedup_key_uses_raw_expiry() {
        let item = ReminderItem {
            khatma_number: 7,
            juz_number: 12,
            reservation_expires_at: "2026-03-01T10:00:00+00:00".to_string(),
            due_soon: true,
            minutes_left: 30,
        };
        assert_eq!(dedup_key(&item), "7-12-2026-03-01T10:00:00+00:00");
    }

    #[test]
    fn due_soon_inside_the_last_hour() {
        let (r, now) = record(30, false);
        assert!(r.is_due_soon(now));
        assert_eq!(r.minutes_left(now), 30);

        let (r, now) = record(60, false);
        assert!(r.is_due_soon(now));
    }

    #[test]
    fn not_due_soon_when_far_expired_or_completed() {
        let (r, now) = record(61, false);
        assert!(!r.is_due_soon(now));

        let (r, now) = record(0, false);
        assert!(!r.is_due_soon(now));

        let (r, now) = record(-5, false);
        assert!(!r.is_due_soon(now));
        assert_eq!(r.minutes_left(now), 0);

        let (r, now) = record(10, true);
        assert!(!r.is_due_soon(now));
    }
}
