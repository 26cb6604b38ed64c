//! # sadaqah-core
//!
//! Live synchronization and reading-reminder controller for the Sadaqah
//! dashboard. Keeps one canonical snapshot of the current khatma, counters,
//! feeds and participant profile in step with the backend, and raises
//! reminders for reservations about to expire.
//!
//! ## Design Principles
//!
//! - **Push first, poll always**: a WebSocket channel triggers refreshes; a
//!   fixed poll keeps converging when the socket is down.
//! - **All or nothing**: a snapshot is replaced wholesale or kept as is.
//! - **Quiet background**: only interactive reloads and explicit actions
//!   surface errors. Everything else logs and tries again later.
//! - **No globals**: [`LiveController`] owns every timer, task and socket;
//!   dropping it releases them.
//! - **Seams are traits**: [`Backend`], [`Connector`], [`Notifier`] and
//!   [`FlagStore`] are swapped for fakes in tests.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sadaqah_core::{ControllerDeps, LiveConfig, LiveController, StorageConfig};
//!
//! let storage = StorageConfig::default();
//! let config = LiveConfig::load(&storage);
//! let controller = LiveController::start(&config, deps);
//! controller.set_participant("Aisha");
//! let mut snapshots = controller.subscribe_snapshot();
//! ```

pub mod actions;
pub mod api;
pub mod backoff;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod error;
pub mod flags;
pub mod notify;
pub mod poll;
pub mod push;
pub mod reminders;
pub mod storage;
pub mod sync;

pub use actions::{Actions, CompletionOutcome, ReservationOutcome};
pub use api::{Backend, HttpBackend};
pub use backoff::BackoffPolicy;
pub use config::*;
pub use controller::{ControllerDeps, LiveController};
pub use error::{LiveError, Result};
pub use flags::{FileFlagStore, FlagStore, MemoryFlagStore};
pub use notify::{LogNotifier, NotificationPermission, Notifier, ReminderNotification};
pub use push::{
    ChannelEvent, CloseReason, ConnectionState, Connector, FrameStream, Phase, PushChannel,
    PushOptions, WsConnector,
};
pub use reminders::{dedup_key, ReminderScheduler, ReservationRecord};
pub use storage::StorageConfig;
pub use sync::{ProfileSnapshot, RefreshMode, SyncCoordinator, SyncSnapshot, SyncStatus};
