//! sadaqah-live: headless client for the Sadaqah reading dashboard.
//!
//! ## Subcommands
//!
//! - `watch`: keep a live snapshot in sync and raise reading reminders
//! - `reserve` / `complete`: claim or finish a juz of the current khatma
//! - `read`: print the text of a juz
//! - `tasbeeh`: count one dhikr
//! - `dua`: post to the dua wall
//! - `notifications on|off|status`: reading-reminder preference

mod logging;

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sadaqah_core::flags::{read_bool, NOTIFICATIONS_ENABLED_KEY};
use sadaqah_core::sync::FetchLimits;
use sadaqah_core::{
    Actions, ControllerDeps, FileFlagStore, FlagStore, HttpBackend, LiveConfig, LiveController,
    LiveError, LogNotifier, NotificationPermission, ReminderScheduler, StorageConfig,
    SyncCoordinator, SyncSnapshot, WsConnector,
};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "sadaqah-live")]
#[command(about = "Live khatma dashboard and reading reminders")]
#[command(version)]
struct Cli {
    /// REST API base URL (overrides config and SADAQAH_API_BASE_URL)
    #[arg(long, global = true, value_name = "URL")]
    api_url: Option<String>,

    /// Live WebSocket URL (overrides config and SADAQAH_WS_BASE_URL)
    #[arg(long, global = true, value_name = "URL")]
    ws_url: Option<String>,

    /// Participant name
    #[arg(long, short, global = true)]
    name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the current khatma until interrupted
    Watch,

    /// Reserve a juz of the current khatma
    Reserve {
        #[arg(value_name = "JUZ")]
        juz: u32,
    },

    /// Mark a reserved juz as read
    Complete {
        #[arg(value_name = "JUZ")]
        juz: u32,
    },

    /// Print the text of a juz
    Read {
        #[arg(value_name = "JUZ")]
        juz: u32,
    },

    /// Add one to a tasbeeh counter
    Tasbeeh {
        #[arg(value_name = "PHRASE")]
        phrase: String,
    },

    /// Post a dua to the wall
    Dua {
        #[arg(value_name = "TEXT")]
        content: String,
    },

    /// Reading reminder preference
    Notifications {
        #[command(subcommand)]
        action: NotificationsAction,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum NotificationsAction {
    On,
    Off,
    Status,
}

struct Context {
    config: LiveConfig,
    flags: Arc<dyn FlagStore>,
    name: String,
}

impl Context {
    fn notifier(&self) -> Arc<LogNotifier> {
        // Enabling reminders earlier was the user's consent.
        let permission = if read_bool(self.flags.as_ref(), NOTIFICATIONS_ENABLED_KEY, false) {
            NotificationPermission::Granted
        } else {
            NotificationPermission::Default
        };
        Arc::new(LogNotifier::new(permission))
    }

    fn backend(&self) -> Result<Arc<HttpBackend>, LiveError> {
        Ok(Arc::new(HttpBackend::from_config(&self.config)?))
    }

    /// Coordinator, reminders and actions without the live machinery, for
    /// one-shot commands.
    fn one_shot(&self) -> Result<(Arc<SyncCoordinator>, Arc<ReminderScheduler>, Actions), LiveError> {
        let coordinator = Arc::new(SyncCoordinator::new(
            self.backend()?,
            FetchLimits {
                activity: self.config.activity_limit,
                history: self.config.history_limit,
            },
        ));
        coordinator.set_identity(&self.name);
        let reminders = Arc::new(ReminderScheduler::new(
            Arc::clone(&coordinator),
            self.notifier(),
            Arc::clone(&self.flags),
            self.config.reminder_interval(),
        ));
        let actions = Actions::new(Arc::clone(&coordinator), Arc::clone(&reminders));
        Ok((coordinator, reminders, actions))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let storage = StorageConfig::default();
    let _logging_guard = logging::init(&storage.logs_dir());

    let mut config = LiveConfig::load(&storage);
    if let Some(api_url) = cli.api_url {
        config.api_base_url = api_url;
    }
    if let Some(ws_url) = cli.ws_url {
        config.ws_url = Some(ws_url);
    }
    if let Err(err) = config.validate() {
        error!(error = %err, "Invalid configuration");
        return ExitCode::FAILURE;
    }

    let ctx = Context {
        config,
        flags: Arc::new(FileFlagStore::open(&storage.flags_file())),
        name: cli.name.unwrap_or_default().trim().to_string(),
    };

    let result = match cli.command {
        Commands::Watch => watch(&ctx).await,
        Commands::Reserve { juz } => reserve(&ctx, juz).await,
        Commands::Complete { juz } => complete(&ctx, juz).await,
        Commands::Read { juz } => read(&ctx, juz).await,
        Commands::Tasbeeh { phrase } => tasbeeh(&ctx, &phrase).await,
        Commands::Dua { content } => dua(&ctx, &content).await,
        Commands::Notifications { action } => notifications(&ctx, action).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "sadaqah-live failed");
            eprintln!("{}", err.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn watch(ctx: &Context) -> Result<(), LiveError> {
    let mut controller = LiveController::start(
        &ctx.config,
        ControllerDeps {
            backend: ctx.backend()?,
            connector: Arc::new(WsConnector),
            notifier: ctx.notifier(),
            flags: Arc::clone(&ctx.flags),
        },
    );
    if !ctx.name.is_empty() {
        controller.set_participant(&ctx.name);
    }

    let mut snapshots = controller.subscribe_snapshot();
    let mut profile = controller.subscribe_profile();
    let mut connection = controller.subscribe_connection();
    let mut status = controller.subscribe_status();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = Arc::clone(&snapshots.borrow_and_update());
                print_snapshot(&snapshot, &ctx.name);
            }
            changed = profile.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = profile.borrow_and_update().clone();
                if let Some(current) = current {
                    let (pending, due_soon) = current
                        .reminders
                        .as_ref()
                        .map(|list| (list.pending_count, list.due_soon_count))
                        .unwrap_or_default();
                    let completions = current
                        .stats
                        .as_ref()
                        .map(|stats| stats.completions_count)
                        .unwrap_or_default();
                    println!(
                        "{}: {} completed, {} pending, {} due soon",
                        current.name, completions, pending, due_soon
                    );
                }
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = connection.borrow_and_update().clone();
                info!(phase = ?state.phase, retry_count = state.retry_count, "Live connection");
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let error = status.borrow_and_update().error.clone();
                if let Some(message) = error {
                    warn!(%message, "Dashboard error");
                }
            }
        }
    }

    controller.dispose();
    Ok(())
}

fn print_snapshot(snapshot: &SyncSnapshot, name: &str) {
    let Some(current) = &snapshot.khatma else {
        return;
    };
    println!(
        "Khatma {}: {}/{} completed, {} reserved",
        current.khatma.number, current.completed_count, current.total_juz, current.reserved_count
    );
    let now = chrono::Utc::now();
    for record in snapshot.reservations_for(name) {
        let due = if record.is_due_soon(now) { " (due soon)" } else { "" };
        println!(
            "  juz {} reserved until {}{}",
            record.unit_id,
            record.reservation_expires_at.format("%Y-%m-%d %H:%M"),
            due
        );
    }
}

async fn reserve(ctx: &Context, juz: u32) -> Result<(), LiveError> {
    let (_, _, actions) = ctx.one_shot()?;
    let outcome = actions.reserve(&ctx.name, juz).await?;
    println!(
        "Reserved juz {} of khatma {} for {}",
        outcome.unit.juz_number, outcome.cycle_number, ctx.name
    );
    Ok(())
}

async fn complete(ctx: &Context, juz: u32) -> Result<(), LiveError> {
    let (_, _, actions) = ctx.one_shot()?;
    let outcome = actions.complete(&ctx.name, juz).await?;
    match (outcome.cycle_completed_now, outcome.next_cycle_number) {
        (true, Some(next)) => println!(
            "Khatma {} is complete. Khatma {} has begun.",
            outcome.cycle_number, next
        ),
        _ => println!("Juz {} recorded as read", outcome.unit.juz_number),
    }
    Ok(())
}

async fn read(ctx: &Context, juz: u32) -> Result<(), LiveError> {
    let (_, _, actions) = ctx.one_shot()?;
    let content = actions.read_juz(juz).await?;
    println!(
        "Juz {}: {} to {}, {} ayahs",
        content.juz_number, content.first_surah, content.last_surah, content.ayah_count
    );
    for section in content.by_surah() {
        println!();
        println!("{}", section.surah_name);
        for ayah in section.ayahs {
            match ayah.number_in_surah {
                Some(number) => println!("  {} ({})", ayah.text, number),
                None => println!("  {}", ayah.text),
            }
        }
    }
    Ok(())
}

async fn tasbeeh(ctx: &Context, phrase: &str) -> Result<(), LiveError> {
    let (_, _, actions) = ctx.one_shot()?;
    let counter = actions.increment_tasbeeh(phrase, &ctx.name).await?;
    println!("{}: {}", counter.phrase, counter.count);
    Ok(())
}

async fn dua(ctx: &Context, content: &str) -> Result<(), LiveError> {
    let (_, _, actions) = ctx.one_shot()?;
    let created = actions.create_dua(&ctx.name, content).await?;
    println!("Posted dua #{}", created.id);
    Ok(())
}

async fn notifications(ctx: &Context, action: NotificationsAction) -> Result<(), LiveError> {
    let (_, reminders, _) = ctx.one_shot()?;
    let enabled = reminders.is_enabled();
    match action {
        NotificationsAction::Status => {
            println!(
                "Reading reminders are {} ({} already sent)",
                if enabled { "on" } else { "off" },
                reminders.notified().len()
            );
        }
        NotificationsAction::On if enabled => println!("Reading reminders are already on"),
        NotificationsAction::Off if !enabled => println!("Reading reminders are already off"),
        NotificationsAction::On | NotificationsAction::Off => {
            let now_enabled = reminders.toggle_notifications(&ctx.name).await?;
            println!(
                "Reading reminders turned {}",
                if now_enabled { "on" } else { "off" }
            );
        }
    }
    Ok(())
}
