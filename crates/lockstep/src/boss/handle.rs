//! Boss-side handle of one worker thread.
//!
//! A handle owns the sending end of the worker's control channel, the worker's
//! terminate flag and its join handle. Once the worker has quit, the boss walks
//! it through a bounded shutdown:
//!
//! ```text
//!   Running ──quit──> GracePeriod ──exits in time──────────────> joined (Exited)
//!                          │
//!                          └─grace expired─> Terminated ──exits─> joined (Terminated)
//!                                                 │
//!                                                 └─still running─> detached (Detached)
//! ```
//!
//! A handle whose thread ends before its Quit arrives is reaped instead and
//! recorded as `Panicked` or `Lost`.
//!
//! Threads cannot be killed, so termination raises the worker's terminate flag
//! and closes its control channel; a worker that ignores both is detached.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::message::{Message, WorkerId};
use crate::worker::panic_reason;

/// How often liveness is polled while waiting for a worker to exit.
const LIVENESS_POLL_MS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Running,
    GracePeriod,
    Terminated,
}

/// How a worker left the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Exited on its own within the grace period.
    Exited,
    /// Exited after its terminate flag was raised.
    Terminated,
    /// Still running after termination; the thread was left behind.
    Detached,
    /// Panicked without sending Quit.
    Panicked,
    /// Returned without sending Quit.
    Lost,
}

impl fmt::Display for ShutdownOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ShutdownOutcome::Exited => "exited",
            ShutdownOutcome::Terminated => "terminated",
            ShutdownOutcome::Detached => "detached",
            ShutdownOutcome::Panicked => "panicked",
            ShutdownOutcome::Lost => "lost",
        };
        f.write_str(text)
    }
}

pub(crate) type WorkerThread = JoinHandle<Option<u32>>;

pub struct WorkerHandle {
    id: WorkerId,
    control: Option<Sender<Message>>,
    thread: Option<WorkerThread>,
    /// Result of the thread once joined; `Err` holds the panic message.
    exit: Option<Result<Option<u32>, String>>,
    terminate: Arc<AtomicBool>,
    state: HandleState,
}

impl WorkerHandle {
    pub(crate) fn new(
        id: WorkerId,
        control: Sender<Message>,
        thread: WorkerThread,
        terminate: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            control: Some(control),
            thread: Some(thread),
            exit: None,
            terminate,
            state: HandleState::Running,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn is_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Send a control message. Returns false if the worker is gone.
    pub(crate) fn send(&self, message: Message) -> bool {
        match &self.control {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Join the thread if it has finished, and return how it ended.
    ///
    /// `Err` carries the panic message of a worker that panicked.
    pub(crate) fn reap_finished(&mut self) -> Option<&Result<Option<u32>, String>> {
        if self.is_alive() {
            return None;
        }
        if let Some(thread) = self.thread.take() {
            self.exit = Some(thread.join().map_err(|payload| panic_reason(payload.as_ref())));
        }
        self.exit.as_ref()
    }

    /// Consume a reaped handle, yielding how its thread ended.
    pub(crate) fn into_exit(self) -> Option<Result<Option<u32>, String>> {
        self.exit
    }

    /// Wait up to `grace` for the worker to exit, then terminate it.
    pub(crate) fn shut_down(mut self, grace: Duration, reap: Duration) -> ShutdownOutcome {
        self.state = HandleState::GracePeriod;
        tracing::debug!(worker = self.id.0, "waiting up to {:?} for exit", grace);

        if self.wait_for_exit(grace) {
            self.join();
            return ShutdownOutcome::Exited;
        }

        tracing::warn!(worker = self.id.0, "did not end after {:?}", grace);
        self.force_terminate(reap)
    }

    /// Raise the terminate flag and close the control channel.
    pub(crate) fn signal_terminate(&mut self) {
        if self.state != HandleState::Terminated {
            tracing::warn!(worker = self.id.0, "call terminate");
            self.state = HandleState::Terminated;
        }
        self.terminate.store(true, Ordering::Relaxed);
        self.control.take();
    }

    /// Terminate the worker and wait up to `reap` before giving up on the
    /// thread.
    pub(crate) fn force_terminate(&mut self, reap: Duration) -> ShutdownOutcome {
        self.signal_terminate();

        if self.wait_for_exit(reap) {
            tracing::warn!(worker = self.id.0, "call final join");
            self.join();
            ShutdownOutcome::Terminated
        } else {
            tracing::warn!(
                worker = self.id.0,
                "still running {:?} after terminate, detaching thread",
                reap
            );
            self.thread.take();
            ShutdownOutcome::Detached
        }
    }

    pub(crate) fn wait_for_exit(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while self.is_alive() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep((deadline - now).min(Duration::from_millis(LIVENESS_POLL_MS)));
        }
        true
    }

    fn join(&mut self) {
        let id = self.id;
        if let Some(Err(reason)) = self.reap_finished() {
            tracing::error!(worker = id.0, "worker panicked after quitting: {}", reason);
        }
    }
}
