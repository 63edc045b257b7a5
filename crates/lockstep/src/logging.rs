//! src/logging.rs
//!
//! Log sinks for a run: one for the boss, one per worker.
//!
//! The boss logs through the global `tracing` subscriber (stderr, plus
//! `Boss_stdout.log` when a log directory is given). Each worker thread installs
//! its own thread-scoped subscriber writing to `Worker_{id}.log`, so lines from
//! different workers never interleave in one file.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{Error, Result};
use crate::message::WorkerId;

pub const BOSS_LOG_FILE: &str = "Boss_stdout.log";

pub fn worker_log_path(dir: &Path, id: WorkerId) -> PathBuf {
    dir.join(format!("Worker_{}.log", id.0))
}

/// Install the global subscriber used by the boss.
///
/// The returned guard flushes the log file when dropped; keep it alive for the
/// whole run.
pub fn init_boss(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = fmt::layer()
        .with_writer(io::stderr)
        .with_thread_names(true);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).map_err(|e| {
                Error::Logging(format!("cannot create log dir {}: {}", dir.display(), e))
            })?;
            let appender = tracing_appender::rolling::never(dir, BOSS_LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_names(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))?;

    Ok(guard)
}

/// Subscriber writing one worker's log file, at debug level.
pub fn worker_subscriber(dir: &Path, id: WorkerId) -> io::Result<impl Subscriber + Send + Sync> {
    fs::create_dir_all(dir)?;
    let file = File::create(worker_log_path(dir, id))?;

    Ok(tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish())
}
