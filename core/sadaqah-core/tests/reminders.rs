mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use common::{reminder, FakeBackend, RecordingNotifier, REMINDERS};
use sadaqah_core::flags::{
    read_bool, read_json, write_bool, NOTIFICATIONS_ENABLED_KEY, NOTIFIED_REMINDERS_KEY,
};
use sadaqah_core::sync::FetchLimits;
use sadaqah_core::{
    dedup_key, FileFlagStore, FlagStore, LiveError, MemoryFlagStore, NotificationPermission,
    ReminderScheduler, SyncCoordinator,
};
use tempfile::tempdir;
use tokio::sync::watch;
use tokio::time::sleep;

struct Harness {
    backend: Arc<FakeBackend>,
    sync: Arc<SyncCoordinator>,
    notifier: Arc<RecordingNotifier>,
    flags: Arc<dyn FlagStore>,
    scheduler: Arc<ReminderScheduler>,
}

fn harness(notifier: Arc<RecordingNotifier>, flags: Arc<dyn FlagStore>) -> Harness {
    let backend = FakeBackend::new();
    backend.set_reminders(vec![
        reminder(3, 5, true),
        reminder(3, 9, true),
        reminder(3, 12, false),
    ]);
    let sync = Arc::new(SyncCoordinator::new(backend.clone(), FetchLimits::default()));
    sync.set_identity("Aisha");
    let scheduler = Arc::new(ReminderScheduler::new(
        sync.clone(),
        notifier.clone(),
        flags.clone(),
        Duration::from_secs(60),
    ));
    Harness {
        backend,
        sync,
        notifier,
        flags,
        scheduler,
    }
}

fn enabled_flags() -> Arc<dyn FlagStore> {
    let flags = MemoryFlagStore::new();
    write_bool(&flags, NOTIFICATIONS_ENABLED_KEY, true);
    Arc::new(flags)
}

#[tokio::test]
async fn test_dedup_across_ticks() {
    let h = harness(RecordingNotifier::granted(), enabled_flags());

    assert_eq!(h.scheduler.check_and_notify("Aisha").await, 2);
    assert_eq!(h.scheduler.check_and_notify("Aisha").await, 0);
    assert_eq!(h.scheduler.check_and_notify(" Aisha ").await, 0);

    let shown = h.notifier.shown();
    assert_eq!(shown.len(), 2);
    assert_eq!(shown[0].tag, dedup_key(&reminder(3, 5, true)));
    assert_eq!(h.scheduler.notified().len(), 2);
    assert_eq!(h.backend.calls(REMINDERS), 3);
}

#[tokio::test]
async fn test_renewed_reservation_notifies_again() {
    let h = harness(RecordingNotifier::granted(), enabled_flags());
    assert_eq!(h.scheduler.check_and_notify("Aisha").await, 2);

    let mut renewed = reminder(3, 5, true);
    renewed.reservation_expires_at = "2026-03-02T05:00:00+00:00".to_string();
    h.backend.set_reminders(vec![renewed, reminder(3, 9, true)]);

    assert_eq!(h.scheduler.check_and_notify("Aisha").await, 1);
    assert_eq!(h.notifier.shown().len(), 3);
}

#[tokio::test]
async fn test_dedup_across_toggles() {
    let h = harness(RecordingNotifier::granted(), enabled_flags());
    assert_eq!(h.scheduler.check_and_notify("Aisha").await, 2);

    assert!(!h.scheduler.toggle_notifications("Aisha").await.expect("off"));
    assert!(!read_bool(h.flags.as_ref(), NOTIFICATIONS_ENABLED_KEY, true));
    assert_eq!(h.scheduler.notified().len(), 2);

    assert!(h.scheduler.toggle_notifications("Aisha").await.expect("on"));
    assert!(read_bool(h.flags.as_ref(), NOTIFICATIONS_ENABLED_KEY, false));
    assert_eq!(h.notifier.shown().len(), 2);
}

#[tokio::test]
async fn test_disabled_never_notifies_but_publishes_reminders() {
    let h = harness(
        RecordingNotifier::granted(),
        Arc::new(MemoryFlagStore::new()),
    );
    assert!(!h.scheduler.is_enabled());

    assert_eq!(h.scheduler.check_and_notify("Aisha").await, 0);
    assert!(h.notifier.shown().is_empty());
    assert!(h.scheduler.notified().is_empty());

    let profile = h.sync.profile().expect("profile");
    let reminders = profile.reminders.as_ref().expect("reminders");
    assert_eq!(reminders.pending_count, 3);
    assert_eq!(reminders.due_soon_count, 2);
}

#[tokio::test]
async fn test_permission_not_granted_never_notifies() {
    let h = harness(
        RecordingNotifier::asking(NotificationPermission::Denied),
        enabled_flags(),
    );
    assert_eq!(h.scheduler.check_and_notify("Aisha").await, 0);
    assert!(h.notifier.shown().is_empty());
}

#[tokio::test]
async fn test_empty_identity_is_a_no_op() {
    let h = harness(RecordingNotifier::granted(), enabled_flags());
    assert_eq!(h.scheduler.check_and_notify("   ").await, 0);
    assert_eq!(h.backend.calls(REMINDERS), 0);
}

#[tokio::test]
async fn test_toggle_on_unsupported_host() {
    let h = harness(
        RecordingNotifier::unsupported(),
        Arc::new(MemoryFlagStore::new()),
    );
    let err = h
        .scheduler
        .toggle_notifications("Aisha")
        .await
        .expect_err("unsupported");
    assert!(matches!(err, LiveError::NotificationsUnsupported));
    assert!(!h.scheduler.is_enabled());
}

#[tokio::test]
async fn test_toggle_on_denied_permission() {
    let h = harness(
        RecordingNotifier::asking(NotificationPermission::Denied),
        Arc::new(MemoryFlagStore::new()),
    );
    let err = h
        .scheduler
        .toggle_notifications("Aisha")
        .await
        .expect_err("denied");
    assert!(matches!(err, LiveError::NotificationPermissionDenied));
    assert!(!h.scheduler.is_enabled());
    assert!(!read_bool(h.flags.as_ref(), NOTIFICATIONS_ENABLED_KEY, false));
}

#[tokio::test]
async fn test_toggle_on_grants_and_checks_immediately() {
    let h = harness(
        RecordingNotifier::asking(NotificationPermission::Granted),
        Arc::new(MemoryFlagStore::new()),
    );
    assert!(h.scheduler.toggle_notifications("Aisha").await.expect("on"));
    assert!(h.scheduler.is_enabled());
    assert_eq!(h.notifier.shown().len(), 2);
}

#[tokio::test]
async fn test_fetch_failure_is_swallowed() {
    let h = harness(RecordingNotifier::granted(), enabled_flags());
    h.backend.fail(REMINDERS);

    assert_eq!(h.scheduler.check_and_notify("Aisha").await, 0);
    assert_eq!(h.sync.status().error, None);
    assert!(h.sync.profile().is_none());
}

#[tokio::test]
async fn test_dedup_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("flags.json");

    let first: Arc<dyn FlagStore> = Arc::new(FileFlagStore::open(&path));
    write_bool(first.as_ref(), NOTIFICATIONS_ENABLED_KEY, true);
    let h = harness(RecordingNotifier::granted(), first);
    assert_eq!(h.scheduler.check_and_notify("Aisha").await, 2);
    drop(h);

    let reopened: Arc<dyn FlagStore> = Arc::new(FileFlagStore::open(&path));
    let h = harness(RecordingNotifier::granted(), reopened);
    assert!(h.scheduler.is_enabled());
    assert_eq!(h.scheduler.check_and_notify("Aisha").await, 0);
    assert!(h.notifier.shown().is_empty());
}

#[tokio::test]
async fn test_overlapping_checks_write_file_once_per_key() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("flags.json");
    let store: Arc<dyn FlagStore> = Arc::new(FileFlagStore::open(&path));
    write_bool(store.as_ref(), NOTIFICATIONS_ENABLED_KEY, true);
    let h = harness(RecordingNotifier::granted(), store);

    let (first, second) = tokio::join!(
        h.scheduler.check_and_notify("Aisha"),
        h.scheduler.check_and_notify("Aisha")
    );
    assert_eq!(first + second, 2);
    assert_eq!(h.notifier.shown().len(), 2);

    let reopened = FileFlagStore::open(&path);
    let persisted: BTreeMap<String, bool> =
        read_json(&reopened, NOTIFIED_REMINDERS_KEY).expect("dedup map on disk");
    assert_eq!(persisted.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_loop_checks_immediately_then_every_interval() {
    let h = harness(RecordingNotifier::granted(), enabled_flags());
    let (identity, identity_rx) = watch::channel(String::new());
    let task = h.scheduler.spawn(identity_rx);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(h.backend.calls(REMINDERS), 0);

    identity.send_replace("Aisha".to_string());
    sleep(Duration::from_secs(1)).await;
    assert_eq!(h.backend.calls(REMINDERS), 1);

    // t = 0, 60, 120 after the identity settled.
    sleep(Duration::from_secs(125)).await;
    assert_eq!(h.backend.calls(REMINDERS), 3);
    assert_eq!(h.notifier.shown().len(), 2);

    task.abort();
}

#[tokio::test(start_paused = true)]
async fn test_loop_pauses_while_disabled() {
    let h = harness(
        RecordingNotifier::asking(NotificationPermission::Granted),
        Arc::new(MemoryFlagStore::new()),
    );
    let (_identity, identity_rx) = watch::channel("Aisha".to_string());
    let task = h.scheduler.spawn(identity_rx);

    sleep(Duration::from_secs(300)).await;
    assert_eq!(h.backend.calls(REMINDERS), 0);

    assert!(h.scheduler.toggle_notifications("Aisha").await.expect("on"));
    sleep(Duration::from_secs(1)).await;
    // The toggle's own check plus the loop's immediate tick.
    assert_eq!(h.backend.calls(REMINDERS), 2);
    assert_eq!(h.notifier.shown().len(), 2);

    assert!(!h.scheduler.toggle_notifications("Aisha").await.expect("off"));
    sleep(Duration::from_secs(300)).await;
    assert_eq!(h.backend.calls(REMINDERS), 2);

    task.abort();
}
