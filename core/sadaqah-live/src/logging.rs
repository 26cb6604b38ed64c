//! Logging setup: stderr plus a daily rolling file under `~/.sadaqah/logs`.
//!
//! `SADAQAH_DEBUG_LOG=1` forces debug level; otherwise `RUST_LOG` applies,
//! defaulting to `info`.

use std::env;
use std::path::Path;

use fs_err as fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEBUG_ENV: &str = "SADAQAH_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "sadaqah-live.log";

fn filter() -> EnvFilter {
    let debug_enabled = env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and closes the file writer.
pub fn init(logs_dir: &Path) -> Option<WorkerGuard> {
    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);

    if let Err(err) = fs::create_dir_all(logs_dir) {
        let _ = tracing_subscriber::registry()
            .with(filter())
            .with(stderr)
            .try_init();
        tracing::warn!(error = %err, "File logging disabled");
        return None;
    }

    let appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file = fmt::layer().with_writer(writer).with_ansi(false);
    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(stderr)
        .with(file)
        .try_init();
    Some(guard)
}
