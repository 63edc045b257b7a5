//! The coordinator of a run.
//!
//! The boss owns the worker pool and the shared inbound channel, and drives the
//! run from a single control loop:
//!
//! ```text
//!   spawn N workers ─> wait for N x Ready ─> broadcast BeginTest (once)
//!                                                   │
//!        summary <─ quit_count == N <─ Quit: record result, shut worker down
//! ```
//!
//! Counters are plain fields: only the loop thread touches them. Workers talk to
//! the boss exclusively through the inbound channel.
//!
//! A worker that fails its tests still quits normally and is recorded. A worker
//! thread that dies without ever sending Quit is reaped, recorded as a failed
//! result with no error count, and counted as finished so the run still ends
//! with a summary of every worker.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use tracing::Level;

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::message::{Message, MessageHandler, Peer, Status, WorkerId};
use crate::probe::Probe;
use crate::worker::{WorkerAgent, WorkerLinks, WorkerSettings};

mod handle;
mod summary;

pub use handle::{HandleState, ShutdownOutcome, WorkerHandle};
pub use summary::{RunSummary, WorkerResult};

/// Stops a running [`Boss::run`] from another thread.
#[derive(Debug, Clone)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct Boss {
    config: PoolConfig,
    pool: Vec<WorkerHandle>,
    inbound: Receiver<Message>,
    pool_size: usize,
    ready: BTreeSet<WorkerId>,
    quit_count: usize,
    releases_sent: usize,
    results: BTreeMap<WorkerId, Option<u32>>,
    shutdowns: BTreeMap<WorkerId, ShutdownOutcome>,
    panics: BTreeMap<WorkerId, String>,
    abort: Arc<AtomicBool>,
}

impl Boss {
    /// Spawn one [`WorkerAgent`] per configured worker id, all probing with
    /// `probe`.
    pub fn new(config: PoolConfig, probe: Arc<dyn Probe>) -> Result<Self> {
        let settings = WorkerSettings::from(&config);
        Self::with_worker_fn(config, move |id, links| {
            WorkerAgent::new(id, settings.clone(), probe.clone(), links).run()
        })
    }

    /// Spawn one thread per configured worker id running `worker_fn`.
    ///
    /// The function receives the worker's identity and its channel ends, and
    /// returns the error count it reported (or `None` if it never ran).
    pub fn with_worker_fn<F>(config: PoolConfig, worker_fn: F) -> Result<Self>
    where
        F: Fn(WorkerId, WorkerLinks) -> Option<u32> + Send + Sync + 'static,
    {
        config.validate()?;

        let pool_size = config.pool_size();
        let (inbound_tx, inbound_rx) = bounded(config.inbound_capacity()?);
        let worker_fn = Arc::new(worker_fn);
        let mut pool = Vec::with_capacity(pool_size);

        for &id in &config.worker_ids {
            let (control_tx, control_rx) = bounded(config.channel_capacity);
            let terminate = Arc::new(AtomicBool::new(false));
            let links = WorkerLinks {
                from_boss: control_rx,
                to_boss: inbound_tx.clone(),
                terminate: terminate.clone(),
            };
            let worker_fn = worker_fn.clone();

            let thread = thread::Builder::new()
                .name(format!("worker-{}", id.0))
                .spawn(move || worker_fn(id, links))
                .map_err(|source| Error::Spawn { id, source })?;

            pool.push(WorkerHandle::new(id, control_tx, thread, terminate));
        }
        // Only workers hold senders from here on.
        drop(inbound_tx);

        tracing::info!(workers = pool_size, "spawned worker pool");

        Ok(Self {
            config,
            pool,
            inbound: inbound_rx,
            pool_size,
            ready: BTreeSet::new(),
            quit_count: 0,
            releases_sent: 0,
            results: BTreeMap::new(),
            shutdowns: BTreeMap::new(),
            panics: BTreeMap::new(),
            abort: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle(self.abort.clone())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Workers that have not been shut down yet.
    pub fn live_workers(&self) -> usize {
        self.pool.len()
    }

    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    pub fn quit_count(&self) -> usize {
        self.quit_count
    }

    /// Workers whose thread ended without sending Quit.
    pub fn lost_count(&self) -> usize {
        self.results.len() - self.quit_count
    }

    /// Workers accounted for: quit, or ended without quitting.
    fn finished_count(&self) -> usize {
        self.results.len()
    }

    /// True once every worker still expected to announce itself is ready.
    fn all_ready(&self) -> bool {
        let gone_unready = self
            .results
            .keys()
            .filter(|id| !self.ready.contains(id))
            .count();
        self.ready_count() + gone_unready == self.pool_size
    }

    /// Number of BeginTest broadcasts sent; 0 or 1.
    pub fn releases_sent(&self) -> usize {
        self.releases_sent
    }

    /// Run the control loop until every worker has quit or ended without
    /// quitting.
    pub fn run(&mut self) -> Result<RunSummary> {
        tracing::info!(
            host = %self.config.target,
            cycles = self.config.cycles,
            "Start run with {} workers",
            self.pool_size
        );

        loop {
            if self.abort.load(Ordering::Relaxed) {
                return Err(Error::Aborted {
                    ready: self.ready_count(),
                    quit: self.quit_count,
                    pool: self.pool_size,
                });
            }

            if self.releases_sent == 0 && !self.pool.is_empty() && self.all_ready() {
                self.release();
            }

            if self.finished_count() == self.pool_size {
                tracing::info!("All Workers quit, end program");
                break;
            }

            match self.inbound.recv_timeout(self.config.recv_timeout) {
                Ok(message) => message.handle(&mut *self),
                Err(RecvTimeoutError::Timeout) => self.reap_lost_workers(),
                Err(RecvTimeoutError::Disconnected) => {
                    // Every worker thread is on its way out; give them time to finish.
                    for handle in &self.pool {
                        handle.wait_for_exit(self.config.reap_timeout);
                    }
                    self.reap_lost_workers();
                    if self.finished_count() < self.pool_size {
                        return Err(Error::ChannelClosed {
                            quit: self.quit_count,
                            pool: self.pool_size,
                        });
                    }
                }
            }
        }

        Ok(self.summary())
    }

    fn release(&mut self) {
        tracing::info!("All Workers ready, start test");
        for handle in &self.pool {
            if !handle.send(Message::status(Peer::Boss, Status::BeginTest)) {
                tracing::warn!(worker = handle.id().0, "control channel closed, not released");
            }
        }
        self.releases_sent += 1;
    }

    /// Record every worker thread that ended without its Quit being received.
    ///
    /// Threads are joined before the inbound channel is checked: anything they
    /// sent is visible by then, so a Quit still waiting in the channel is
    /// processed first and the worker is not mistaken for lost.
    fn reap_lost_workers(&mut self) {
        let mut finished = Vec::new();
        for (pos, handle) in self.pool.iter_mut().enumerate() {
            if handle.reap_finished().is_some() {
                finished.push(pos);
            }
        }
        if finished.is_empty() || !self.inbound.is_empty() {
            return;
        }

        for pos in finished.into_iter().rev() {
            let handle = self.pool.remove(pos);
            let id = handle.id();
            let outcome = match handle.into_exit() {
                Some(Err(reason)) => {
                    tracing::error!(worker = id.0, "worker panicked before quitting: {}", reason);
                    self.panics.insert(id, reason);
                    ShutdownOutcome::Panicked
                }
                _ => {
                    tracing::error!(worker = id.0, "worker exited without sending Quit");
                    ShutdownOutcome::Lost
                }
            };
            self.results.insert(id, None);
            self.shutdowns.insert(id, outcome);
            tracing::info!(
                worker = id.0,
                %outcome,
                live = self.pool.len(),
                "worker removed from pool"
            );
        }
    }

    fn member(&self, sender: Peer) -> Option<WorkerId> {
        match sender {
            Peer::Worker(id) if self.config.worker_ids.contains(&id) => Some(id),
            _ => None,
        }
    }

    fn summary(&self) -> RunSummary {
        let results = self
            .results
            .iter()
            .map(|(&id, &error_count)| WorkerResult {
                id,
                error_count,
                shutdown: self
                    .shutdowns
                    .get(&id)
                    .copied()
                    .unwrap_or(ShutdownOutcome::Exited),
                panic: self.panics.get(&id).cloned(),
            })
            .collect();

        RunSummary {
            cycles: self.config.cycles,
            results,
        }
    }
}

impl MessageHandler for Boss {
    fn on_status(&mut self, sender: Peer, status: Status) {
        tracing::debug!("worker_id:{}, status: {:?}", sender, status);
        let Some(id) = self.member(sender) else {
            tracing::warn!("protocol violation: status {:?} from {}", status, sender);
            return;
        };

        match status {
            Status::Ready => {
                if !self.ready.insert(id) {
                    tracing::warn!(worker = id.0, "protocol violation: duplicate Ready");
                }
            }
            Status::Complete => tracing::debug!(worker = id.0, "test loop complete"),
            Status::BeginTest => {
                tracing::warn!(worker = id.0, "protocol violation: BeginTest from a worker")
            }
        }
    }

    fn on_log(&mut self, sender: Peer, level: Level, text: String) {
        if level == Level::ERROR {
            tracing::error!("[{}][{}] - {}", sender, level, text);
        } else if level == Level::WARN {
            tracing::warn!("[{}][{}] - {}", sender, level, text);
        } else if level == Level::INFO {
            tracing::info!("[{}][{}] - {}", sender, level, text);
        } else if level == Level::DEBUG {
            tracing::debug!("[{}][{}] - {}", sender, level, text);
        } else {
            tracing::trace!("[{}][{}] - {}", sender, level, text);
        }
    }

    fn on_quit(&mut self, sender: Peer, exit_status: u32) {
        let Some(id) = self.member(sender) else {
            tracing::warn!("protocol violation: quit from {}", sender);
            return;
        };
        if self.results.contains_key(&id) {
            tracing::warn!(worker = id.0, "protocol violation: duplicate Quit");
            return;
        }

        tracing::info!("Quit received from {}, error_count: {}", id, exit_status);
        self.results.insert(id, Some(exit_status));
        self.quit_count += 1;

        if let Some(pos) = self.pool.iter().position(|h| h.id() == id) {
            let handle = self.pool.remove(pos);
            tracing::info!("Calling clean_up on {}", id);
            let outcome = handle.shut_down(self.config.grace_period, self.config.reap_timeout);
            tracing::info!(
                worker = id.0,
                %outcome,
                live = self.pool.len(),
                "worker removed from pool"
            );
            self.shutdowns.insert(id, outcome);
        }
    }
}

impl Drop for Boss {
    fn drop(&mut self) {
        if self.pool.is_empty() {
            return;
        }

        // Signal every worker first, then wait for each.
        for handle in &mut self.pool {
            handle.signal_terminate();
        }
        for mut handle in self.pool.drain(..) {
            if handle.is_alive() {
                handle.force_terminate(self.config.reap_timeout);
            } else {
                handle.reap_finished();
            }
        }
    }
}
