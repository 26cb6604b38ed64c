//! Owner of every live handle for one dashboard session.
//!
//! ```text
//!  PushChannel ──message──▶ silent refresh ─┐
//!  PollTimer ───tick──────▶ silent refresh ─┼──▶ SyncCoordinator ──▶ watch receivers
//!  set_participant ─debounce─▶ profile ─────┘          │
//!                     └──settled name──▶ ReminderScheduler ──▶ Notifier
//! ```
//!
//! Consumers only read through watch receivers. [`LiveController::dispose`]
//! (or dropping the controller) stops the socket, the timers and the
//! background tasks, and makes every in-flight fetch a no-op.

use std::sync::Arc;

use sadaqah_protocol::LiveEvent;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::actions::Actions;
use crate::api::Backend;
use crate::config::LiveConfig;
use crate::debounce::Debouncer;
use crate::error::Result;
use crate::flags::FlagStore;
use crate::notify::Notifier;
use crate::poll::PollTimer;
use crate::push::{ChannelEvent, ConnectionState, Connector, PushChannel, PushOptions};
use crate::reminders::ReminderScheduler;
use crate::sync::{
    FetchLimits, ProfileSnapshot, RefreshMode, SyncCoordinator, SyncSnapshot, SyncStatus,
};

/// Host capabilities the controller is built from.
pub struct ControllerDeps {
    pub backend: Arc<dyn Backend>,
    pub connector: Arc<dyn Connector>,
    pub notifier: Arc<dyn Notifier>,
    pub flags: Arc<dyn FlagStore>,
}

pub struct LiveController {
    coordinator: Arc<SyncCoordinator>,
    reminders: Arc<ReminderScheduler>,
    actions: Actions,
    push: PushChannel,
    poll: PollTimer,
    profile_lookup: Option<Debouncer<String>>,
    tasks: Vec<JoinHandle<()>>,
    disposed: bool,
}

impl LiveController {
    /// Wires everything up and kicks off the first (interactive) load, the
    /// live channel, the poll fallback and the reminder loop. Must be called
    /// from within a tokio runtime.
    pub fn start(config: &LiveConfig, deps: ControllerDeps) -> Self {
        let coordinator = Arc::new(SyncCoordinator::new(
            deps.backend,
            FetchLimits {
                activity: config.activity_limit,
                history: config.history_limit,
            },
        ));
        let reminders = Arc::new(ReminderScheduler::new(
            Arc::clone(&coordinator),
            deps.notifier,
            deps.flags,
            config.reminder_interval(),
        ));
        let actions = Actions::new(Arc::clone(&coordinator), Arc::clone(&reminders));

        let mut tasks = Vec::new();

        let initial = Arc::clone(&coordinator);
        tasks.push(tokio::spawn(async move {
            let _ = initial.refresh(RefreshMode::Loud).await;
        }));

        let (mut push, events) = PushChannel::new(
            deps.connector,
            PushOptions {
                backoff: config.backoff,
                connect_timeout: config.request_timeout(),
            },
        );
        tasks.push(tokio::spawn(forward_channel_events(
            events,
            Arc::clone(&coordinator),
        )));
        push.start(&config.live_ws_url());

        let polled = Arc::clone(&coordinator);
        let poll = PollTimer::spawn(config.poll_interval(), move || {
            let coordinator = Arc::clone(&polled);
            async move {
                let _ = coordinator.refresh(RefreshMode::Silent).await;
            }
        });

        let (settled, settled_rx) = watch::channel(String::new());
        let settled = Arc::new(settled);
        let looked_up = Arc::clone(&coordinator);
        let profile_lookup = Debouncer::spawn(String::new(), config.profile_debounce(), move |name: String| {
            let coordinator = Arc::clone(&looked_up);
            let settled = Arc::clone(&settled);
            async move {
                settled.send_replace(name.clone());
                let _ = coordinator.refresh_profile(&name, RefreshMode::Silent).await;
            }
        });
        tasks.push(reminders.spawn(settled_rx));

        info!(
            api = %config.api_base_url,
            poll_ms = config.poll_interval_ms,
            reminder_ms = config.reminder_interval_ms,
            "Live controller started"
        );

        Self {
            coordinator,
            reminders,
            actions,
            push,
            poll,
            profile_lookup: Some(profile_lookup),
            tasks,
            disposed: false,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inputs
    // ─────────────────────────────────────────────────────────────────────

    /// Sets the participant name as typed. Profile and reminders follow once
    /// the name has settled.
    pub fn set_participant(&self, name: &str) {
        self.coordinator.set_identity(name);
        if let Some(lookup) = &self.profile_lookup {
            lookup.set(name.trim().to_string());
        }
    }

    /// Interactive reload with loading indicator and inline errors.
    pub async fn reload(&self) -> Result<Arc<SyncSnapshot>> {
        self.coordinator.refresh(RefreshMode::Loud).await
    }

    /// Flips reading reminders for the current participant. Refusals are
    /// reported inline and returned.
    pub async fn toggle_notifications(&self) -> Result<bool> {
        let name = self.coordinator.identity();
        match self.reminders.toggle_notifications(&name).await {
            Ok(true) => {
                self.coordinator.report_notice("Reading reminders are on.");
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(err) => {
                self.coordinator.report_error(&err);
                Err(err)
            }
        }
    }

    pub fn actions(&self) -> &Actions {
        &self.actions
    }

    // ─────────────────────────────────────────────────────────────────────
    // Observers
    // ─────────────────────────────────────────────────────────────────────

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub fn reminders(&self) -> &Arc<ReminderScheduler> {
        &self.reminders
    }

    pub fn snapshot(&self) -> Arc<SyncSnapshot> {
        self.coordinator.snapshot()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Arc<SyncSnapshot>> {
        self.coordinator.subscribe()
    }

    pub fn subscribe_profile(&self) -> watch::Receiver<Option<Arc<ProfileSnapshot>>> {
        self.coordinator.subscribe_profile()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.coordinator.subscribe_status()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.push.subscribe()
    }

    /// Live indicator: true while the push channel is open.
    pub fn is_live(&self) -> bool {
        self.push.state().is_connected()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    // ─────────────────────────────────────────────────────────────────────
    // Teardown
    // ─────────────────────────────────────────────────────────────────────

    /// Idempotent. After this nothing commits, notifies or reconnects.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.coordinator.deactivate();
        self.push.stop();
        self.poll.cancel();
        self.profile_lookup = None;
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("Live controller disposed");
    }
}

impl Drop for LiveController {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Every non-handshake message triggers its own silent refresh. Bursts are
/// not coalesced.
async fn forward_channel_events(
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    coordinator: Arc<SyncCoordinator>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ChannelEvent::Message(event) => on_live_message(&coordinator, event),
            ChannelEvent::Open => debug!("Live channel open"),
            ChannelEvent::Closed(reason) => debug!(?reason, "Live channel closed"),
        }
    }
}

fn on_live_message(coordinator: &Arc<SyncCoordinator>, event: LiveEvent) {
    if event.is_handshake() {
        debug!("Live handshake received");
        return;
    }
    if !coordinator.is_active() {
        return;
    }
    debug!(kind = ?event.kind(), "Refreshing after live event");
    let coordinator = Arc::clone(coordinator);
    tokio::spawn(async move {
        coordinator.on_live_event().await;
    });
}
