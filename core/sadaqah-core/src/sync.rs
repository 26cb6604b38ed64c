//! Canonical dashboard state and the single refresh entry point.
//!
//! # Commit rules
//!
//! - A [`SyncSnapshot`] is fetched as seven concurrent calls and committed
//!   only when all of them succeed. A failure keeps the previous snapshot.
//! - Overlapping refreshes are not serialised. Whichever finishes last
//!   commits last, even if it started first and carries older data.
//!   `revision` numbers commits in completion order for observability.
//! - Every mutation after an await checks the still-active flag, so results
//!   landing after [`SyncCoordinator::deactivate`] are dropped.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use sadaqah_protocol::{
    ActivityEvent, CurrentKhatma, DailyWird, DuaMessage, Juz, KhatmaHistory, ProfileStats,
    ReminderList, Stats, TasbeehCounter,
};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::Backend;
use crate::error::{LiveError, Result};
use crate::reminders::ReservationRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Background refresh: no loading indicator, failures only logged.
    Silent,
    /// Interactive refresh: toggles loading and surfaces failures inline.
    Loud,
}

/// Every remote-derived view of the current cycle, fetched together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSnapshot {
    /// Commit number; 0 for the empty snapshot created at start.
    pub revision: u64,
    pub khatma: Option<CurrentKhatma>,
    pub stats: Stats,
    pub tasbeeh: Vec<TasbeehCounter>,
    pub activity: Vec<ActivityEvent>,
    pub dua_wall: Vec<DuaMessage>,
    pub history: KhatmaHistory,
    pub daily_wird: Option<DailyWird>,
}

impl SyncSnapshot {
    pub fn is_empty(&self) -> bool {
        self.revision == 0
    }

    pub fn cycle_number(&self) -> Option<u64> {
        self.khatma.as_ref().map(|current| current.khatma.number)
    }

    /// Units of the current cycle ordered by unit number.
    pub fn sorted_units(&self) -> Vec<&Juz> {
        let mut units: Vec<&Juz> = self
            .khatma
            .iter()
            .flat_map(|current| current.khatma.ajzaa.iter())
            .collect();
        units.sort_by_key(|juz| juz.juz_number);
        units
    }

    /// Reservations in the current cycle held by `name` (trimmed, exact).
    pub fn reservations_for(&self, name: &str) -> Vec<ReservationRecord> {
        let name = name.trim();
        if name.is_empty() {
            return Vec::new();
        }
        self.sorted_units()
            .into_iter()
            .filter(|juz| juz.reserved_by.as_deref().map(str::trim) == Some(name))
            .filter_map(ReservationRecord::from_juz)
            .collect()
    }
}

/// Participant-scoped views for the current identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileSnapshot {
    pub name: String,
    pub stats: Option<ProfileStats>,
    pub reminders: Option<ReminderList>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub loading: bool,
    /// Inline error from the last interactive operation.
    pub error: Option<String>,
    /// Inline confirmation from the last explicit user action.
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct FetchLimits {
    pub activity: u32,
    pub history: u32,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            activity: 35,
            history: 24,
        }
    }
}

pub struct SyncCoordinator {
    backend: Arc<dyn Backend>,
    limits: FetchLimits,
    snapshot: watch::Sender<Arc<SyncSnapshot>>,
    profile: watch::Sender<Option<Arc<ProfileSnapshot>>>,
    status: watch::Sender<SyncStatus>,
    identity: watch::Sender<String>,
    active: AtomicBool,
    revision: AtomicU64,
    loud_in_flight: AtomicUsize,
}

impl SyncCoordinator {
    pub fn new(backend: Arc<dyn Backend>, limits: FetchLimits) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(SyncSnapshot::default()));
        let (profile, _) = watch::channel(None);
        let (status, _) = watch::channel(SyncStatus::default());
        let (identity, _) = watch::channel(String::new());
        Self {
            backend,
            limits,
            snapshot,
            profile,
            status,
            identity,
            active: AtomicBool::new(true),
            revision: AtomicU64::new(0),
            loud_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    // ─────────────────────────────────────────────────────────────────────
    // Observers
    // ─────────────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> Arc<SyncSnapshot> {
        Arc::clone(&self.snapshot.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<SyncSnapshot>> {
        self.snapshot.subscribe()
    }

    pub fn profile(&self) -> Option<Arc<ProfileSnapshot>> {
        self.profile.borrow().clone()
    }

    pub fn subscribe_profile(&self) -> watch::Receiver<Option<Arc<ProfileSnapshot>>> {
        self.profile.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn identity(&self) -> String {
        self.identity.borrow().clone()
    }

    pub fn subscribe_identity(&self) -> watch::Receiver<String> {
        self.identity.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutators
    // ─────────────────────────────────────────────────────────────────────

    /// Records the participant name as typed. The profile itself is fetched
    /// separately (debounced) by the controller.
    pub fn set_identity(&self, name: &str) {
        let name = name.to_string();
        self.identity.send_if_modified(|current| {
            if *current == name {
                false
            } else {
                *current = name;
                true
            }
        });
    }

    /// Stops every later commit. In-flight fetches finish but are discarded.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn report_error(&self, err: &LiveError) {
        if !self.is_active() {
            return;
        }
        let message = err.user_message();
        self.status.send_modify(|status| {
            status.error = Some(message);
            status.notice = None;
        });
    }

    pub fn report_notice(&self, notice: impl Into<String>) {
        if !self.is_active() {
            return;
        }
        let notice = notice.into();
        self.status.send_modify(|status| {
            status.notice = Some(notice);
            status.error = None;
        });
    }

    // ─────────────────────────────────────────────────────────────────────
    // Refresh
    // ─────────────────────────────────────────────────────────────────────

    pub async fn refresh(&self, mode: RefreshMode) -> Result<Arc<SyncSnapshot>> {
        if !self.is_active() {
            return Err(LiveError::Disposed);
        }
        let _loading = match mode {
            RefreshMode::Loud => Some(LoadingGuard::enter(self)),
            RefreshMode::Silent => None,
        };

        let fetched = self.fetch_snapshot().await;
        if !self.is_active() {
            debug!(?mode, "Discarding refresh result after deactivation");
            return Err(LiveError::Disposed);
        }

        match fetched {
            Ok(mut snapshot) => {
                snapshot.revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
                let snapshot = Arc::new(snapshot);
                self.snapshot.send_replace(Arc::clone(&snapshot));
                self.status.send_if_modified(|status| status.error.take().is_some());
                debug!(?mode, revision = snapshot.revision, "Snapshot committed");
                Ok(snapshot)
            }
            Err(err) => {
                match mode {
                    RefreshMode::Loud => self.report_error(&err),
                    // Transient failures are routine while polling.
                    RefreshMode::Silent if err.is_transient() => {
                        debug!(error = %err, "Background refresh failed; keeping previous snapshot")
                    }
                    RefreshMode::Silent => {
                        warn!(error = %err, "Background refresh failed; keeping previous snapshot")
                    }
                }
                Err(err)
            }
        }
    }

    async fn fetch_snapshot(&self) -> Result<SyncSnapshot> {
        let backend = &self.backend;
        let (khatma, stats, tasbeeh, activity, dua_wall, history, daily_wird) = futures::try_join!(
            backend.current_khatma(),
            backend.stats(),
            backend.tasbeeh(),
            backend.activity_feed(self.limits.activity),
            backend.dua_wall(),
            backend.khatma_history(self.limits.history),
            backend.daily_wird(),
        )?;

        Ok(SyncSnapshot {
            revision: 0,
            khatma: Some(khatma),
            stats,
            tasbeeh,
            activity,
            dua_wall,
            history,
            daily_wird: Some(daily_wird),
        })
    }

    /// Fetches profile stats and reminders for `name`. An empty name clears
    /// the profile. Results for a name that is no longer the current identity
    /// are dropped.
    pub async fn refresh_profile(
        &self,
        name: &str,
        mode: RefreshMode,
    ) -> Result<Option<Arc<ProfileSnapshot>>> {
        if !self.is_active() {
            return Err(LiveError::Disposed);
        }
        let name = name.trim();
        if name.is_empty() {
            self.profile.send_replace(None);
            return Ok(None);
        }

        let backend = &self.backend;
        let fetched = futures::try_join!(backend.profile_stats(name), backend.reminders(name));
        if !self.is_active() {
            return Err(LiveError::Disposed);
        }

        match fetched {
            Ok((stats, reminders)) => {
                if !self.is_current_identity(name) {
                    debug!(name, "Dropping profile for superseded identity");
                    return Ok(self.profile());
                }
                let profile = Arc::new(ProfileSnapshot {
                    name: name.to_string(),
                    stats: Some(stats),
                    reminders: Some(reminders),
                });
                self.profile.send_replace(Some(Arc::clone(&profile)));
                Ok(Some(profile))
            }
            Err(err) => {
                match mode {
                    RefreshMode::Loud => self.report_error(&err),
                    RefreshMode::Silent if err.is_transient() => {
                        debug!(error = %err, name, "Background profile refresh failed")
                    }
                    RefreshMode::Silent => {
                        warn!(error = %err, name, "Background profile refresh failed")
                    }
                }
                Err(err)
            }
        }
    }

    /// Push-channel side effect: silent refresh, then the participant's
    /// profile when an identity is set. Never surfaces errors.
    pub async fn on_live_event(&self) {
        let _ = self.refresh(RefreshMode::Silent).await;
        let name = self.identity();
        if !name.trim().is_empty() {
            let _ = self.refresh_profile(&name, RefreshMode::Silent).await;
        }
    }

    /// Replaces the reminder list of the current profile.
    pub fn publish_reminders(&self, name: &str, reminders: ReminderList) {
        self.update_profile(name, |profile| profile.reminders = Some(reminders));
    }

    /// Replaces the profile stats returned by a mutation.
    pub fn publish_profile_stats(&self, name: &str, stats: ProfileStats) {
        self.update_profile(name, |profile| profile.stats = Some(stats));
    }

    fn update_profile(&self, name: &str, apply: impl FnOnce(&mut ProfileSnapshot)) {
        let name = name.trim();
        if !self.is_active() || name.is_empty() || !self.is_current_identity(name) {
            return;
        }
        let mut next = match self.profile() {
            Some(current) if current.name == name => (*current).clone(),
            _ => ProfileSnapshot {
                name: name.to_string(),
                ..ProfileSnapshot::default()
            },
        };
        apply(&mut next);
        self.profile.send_replace(Some(Arc::new(next)));
    }

    fn is_current_identity(&self, name: &str) -> bool {
        self.identity.borrow().trim() == name
    }
}

/// Keeps `loading` raised while at least one loud refresh is in flight,
/// including when the refresh future is dropped mid-way.
struct LoadingGuard<'a> {
    coordinator: &'a SyncCoordinator,
}

impl<'a> LoadingGuard<'a> {
    fn enter(coordinator: &'a SyncCoordinator) -> Self {
        coordinator.loud_in_flight.fetch_add(1, Ordering::SeqCst);
        coordinator
            .status
            .send_if_modified(|status| !std::mem::replace(&mut status.loading, true));
        Self { coordinator }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let remaining = self
            .coordinator
            .loud_in_flight
            .fetch_sub(1, Ordering::SeqCst)
            .saturating_sub(1);
        if remaining == 0 && self.coordinator.is_active() {
            self.coordinator
                .status
                .send_if_modified(|status| std::mem::replace(&mut status.loading, false));
        }
    }
}
