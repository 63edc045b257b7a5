//! Worker side of the pool.
//!
//! A worker is one OS thread running a [`WorkerAgent`]. It talks to the boss
//! through two channels:
//! - its private control channel (boss -> this worker), which only ever carries
//!   the `BeginTest` release signal;
//! - the shared inbound channel (all workers -> boss), for status, log and quit
//!   messages.
//!
//! # Lifecycle
//! 1. Initializing: install the worker's log sink, drain stale control messages
//! 2. Announcing: send `Status(Ready)`
//! 3. Waiting: block until `Status(BeginTest)` arrives
//! 4. Testing: run `cycles` probe iterations, counting errors
//! 5. Completing: send `Status(Complete)`
//! 6. Quitting: send exactly one `Quit(error_count)`

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::config::PoolConfig;
use crate::message::Message;

mod agent;
pub mod thread;

pub(crate) use agent::panic_reason;
pub use agent::{WorkerAgent, WorkerState};

/// Per-worker settings derived from the pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub target: String,
    pub cycles: u32,
    pub probe_timeout: Duration,
    pub poll: Duration,
    pub log_dir: Option<PathBuf>,
    pub seed: Option<u64>,
}

impl From<&PoolConfig> for WorkerSettings {
    fn from(config: &PoolConfig) -> Self {
        Self {
            target: config.target.clone(),
            cycles: config.cycles,
            probe_timeout: config.probe_timeout,
            poll: config.worker_poll,
            log_dir: config.log_dir.clone(),
            seed: config.seed,
        }
    }
}

/// Channel ends and flags handed to a worker thread.
pub struct WorkerLinks {
    pub from_boss: Receiver<Message>,
    pub to_boss: Sender<Message>,
    pub terminate: Arc<AtomicBool>,
}
