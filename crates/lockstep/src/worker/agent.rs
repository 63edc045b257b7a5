//! The worker state machine.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::Level;

use super::thread::{init_worker_rng, set_current_worker};
use super::{WorkerLinks, WorkerSettings};
use crate::logging::worker_subscriber;
use crate::message::{Message, MessageHandler, Peer, Status, WorkerId};
use crate::probe::{Probe, ProbeError, ProbeOutcome};

/// Where a worker is in its lifecycle. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkerState {
    Initializing,
    Announcing,
    Waiting,
    Testing,
    Completing,
    Quitting,
}

/// One test participant.
///
/// Runs on its own thread; see [`WorkerAgent::run`].
pub struct WorkerAgent {
    id: WorkerId,
    settings: WorkerSettings,
    probe: Arc<dyn Probe>,
    from_boss: Receiver<Message>,
    to_boss: Sender<Message>,
    terminate: Arc<AtomicBool>,
    state: WorkerState,
    released: bool,
    iteration: u32,
    error_count: u32,
}

impl WorkerAgent {
    pub fn new(
        id: WorkerId,
        settings: WorkerSettings,
        probe: Arc<dyn Probe>,
        links: WorkerLinks,
    ) -> Self {
        Self {
            id,
            settings,
            probe,
            from_boss: links.from_boss,
            to_boss: links.to_boss,
            terminate: links.terminate,
            state: WorkerState::Initializing,
            released: false,
            iteration: 0,
            error_count: 0,
        }
    }

    /// Run the whole lifecycle and return the error count.
    ///
    /// Returns `None` when the worker was never released: its control channel
    /// closed or it was told to terminate while waiting. No Quit is sent then.
    pub fn run(mut self) -> Option<u32> {
        set_current_worker(self.id);
        if let Some(seed) = self.settings.seed {
            init_worker_rng(self.id, seed);
        }

        // Scoped to this thread; probe logging ends up in the same file.
        let _log_guard = match self.settings.log_dir.as_deref() {
            Some(dir) => match worker_subscriber(dir, self.id) {
                Ok(subscriber) => Some(tracing::subscriber::set_default(subscriber)),
                Err(e) => {
                    tracing::warn!(worker = self.id.0, "cannot open worker log file: {}", e);
                    None
                }
            },
            None => None,
        };
        tracing::info!("Log Initialized");

        self.drain_stale();

        self.enter(WorkerState::Announcing);
        if !self.send(Message::status(self.peer(), Status::Ready)) {
            return None;
        }

        self.enter(WorkerState::Waiting);
        if !self.wait_for_release() {
            tracing::warn!(worker = self.id.0, "never released, exiting without test");
            return None;
        }

        self.enter(WorkerState::Testing);
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.test())) {
            tracing::error!(
                worker = self.id.0,
                iteration = self.iteration,
                error_count = self.error_count,
                "test loop panicked: {}",
                panic_reason(payload.as_ref())
            );
            panic::resume_unwind(payload);
        }

        self.enter(WorkerState::Completing);
        self.send(Message::status(self.peer(), Status::Complete));

        self.enter(WorkerState::Quitting);
        tracing::info!("Send Quit to Boss");
        self.send(Message::quit(self.peer(), self.error_count));

        Some(self.error_count)
    }

    fn enter(&mut self, state: WorkerState) {
        tracing::debug!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn peer(&self) -> Peer {
        Peer::Worker(self.id)
    }

    /// Send to the boss. Returns false if the boss is gone.
    fn send(&self, message: Message) -> bool {
        match self.to_boss.send(message) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(worker = self.id.0, "boss channel closed, dropped {}", e.0);
                false
            }
        }
    }

    /// Empty the control channel of anything left over from a previous run.
    fn drain_stale(&self) {
        for stale in self.from_boss.try_iter() {
            tracing::debug!("discarding stale control message {}", stale);
        }
    }

    fn wait_for_release(&mut self) -> bool {
        while !self.released {
            if self.terminate.load(Ordering::Relaxed) {
                return false;
            }

            match self.from_boss.recv_timeout(self.settings.poll) {
                Ok(message) => {
                    tracing::debug!("reading queue: {}", message);
                    message.handle(&mut *self);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
        true
    }

    fn test(&mut self) {
        tracing::info!("Run Test");

        for iteration in 1..=self.settings.cycles {
            if self.terminate.load(Ordering::Relaxed) {
                tracing::warn!(
                    "terminated before iteration {} of {}",
                    iteration,
                    self.settings.cycles
                );
                break;
            }
            self.iteration = iteration;

            tracing::info!(
                "=====Worker: {}, Iteration:{:>3}, Error Count:{:>3}====",
                self.id,
                iteration,
                self.error_count
            );
            self.send(Message::log(
                self.peer(),
                Level::INFO,
                format!("run{}, error_count:{}", iteration, self.error_count),
            ));

            match self
                .probe
                .probe(&self.settings.target, self.settings.probe_timeout)
            {
                Ok(ProbeOutcome::Success) => {
                    tracing::debug!("iteration {} passed", iteration);
                }
                Ok(ProbeOutcome::Failure) => {
                    self.error_count += 1;
                    tracing::warn!("iteration {} failed", iteration);
                }
                Err(e @ ProbeError::RetriesExhausted { .. }) => {
                    self.error_count += 1;
                    tracing::error!("iteration {}: {}", iteration, e);
                }
                Err(e) => {
                    self.error_count += 1;
                    tracing::error!("iteration {}: probe error: {}", iteration, e);
                }
            }
        }
    }
}

impl MessageHandler for WorkerAgent {
    fn on_status(&mut self, sender: Peer, status: Status) {
        tracing::debug!("Status({}, {:?})", sender, status);
        match (sender, status) {
            (Peer::Boss, Status::BeginTest) => self.released = true,
            _ => tracing::warn!(
                "protocol violation: unexpected status {:?} from {}",
                status,
                sender
            ),
        }
    }

    fn on_log(&mut self, sender: Peer, level: Level, text: String) {
        tracing::warn!(
            "protocol violation: unexpected log from {} [{}] {}",
            sender,
            level,
            text
        );
    }

    fn on_quit(&mut self, sender: Peer, exit_status: u32) {
        tracing::warn!(
            "protocol violation: unexpected quit from {} ({})",
            sender,
            exit_status
        );
    }
}

pub(crate) fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    fn settings(cycles: u32) -> WorkerSettings {
        WorkerSettings {
            target: "device".into(),
            cycles,
            probe_timeout: Duration::from_millis(10),
            poll: Duration::from_millis(5),
            log_dir: None,
            seed: None,
        }
    }

    struct Harness {
        control_tx: Sender<Message>,
        inbound_rx: Receiver<Message>,
        terminate: Arc<AtomicBool>,
        handle: thread::JoinHandle<Option<u32>>,
    }

    fn start(cycles: u32, probe: Arc<dyn Probe>) -> Harness {
        let (control_tx, control_rx) = bounded(4);
        let (inbound_tx, inbound_rx) = bounded(64);
        let terminate = Arc::new(AtomicBool::new(false));
        let links = WorkerLinks {
            from_boss: control_rx,
            to_boss: inbound_tx,
            terminate: terminate.clone(),
        };
        let agent = WorkerAgent::new(WorkerId(1), settings(cycles), probe, links);
        let handle = thread::spawn(move || agent.run());
        Harness {
            control_tx,
            inbound_rx,
            terminate,
            handle,
        }
    }

    fn recv(rx: &Receiver<Message>) -> Message {
        rx.recv_timeout(Duration::from_secs(5)).expect("worker message")
    }

    #[test]
    fn test_no_iteration_before_release() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let probe = move |_: &str, _: Duration| -> Result<ProbeOutcome, ProbeError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ProbeOutcome::Success)
        };
        let h = start(3, Arc::new(probe));

        assert_eq!(
            recv(&h.inbound_rx),
            Message::status(Peer::Worker(WorkerId(1)), Status::Ready)
        );
        thread::sleep(Duration::from_millis(50));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(h.inbound_rx.is_empty());

        h.control_tx
            .send(Message::status(Peer::Boss, Status::BeginTest))
            .unwrap();
        assert_eq!(h.handle.join().unwrap(), Some(0));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_message_sequence_ends_with_single_quit() {
        let probe = |_: &str, _: Duration| -> Result<ProbeOutcome, ProbeError> {
            Ok(ProbeOutcome::Failure)
        };
        let h = start(2, Arc::new(probe));
        h.control_tx
            .send(Message::status(Peer::Boss, Status::BeginTest))
            .unwrap();
        assert_eq!(h.handle.join().unwrap(), Some(2));

        let me = Peer::Worker(WorkerId(1));
        let messages: Vec<Message> = h.inbound_rx.try_iter().collect();
        assert_eq!(
            messages,
            vec![
                Message::status(me, Status::Ready),
                Message::log(me, Level::INFO, "run1, error_count:0"),
                Message::log(me, Level::INFO, "run2, error_count:1"),
                Message::status(me, Status::Complete),
                Message::quit(me, 2),
            ]
        );
    }

    #[test]
    fn test_exhausted_retries_count_as_errors() {
        let probe = |_: &str, _: Duration| -> Result<ProbeOutcome, ProbeError> {
            Err(ProbeError::RetriesExhausted {
                attempts: 3,
                elapsed: Duration::from_millis(1),
                last: "Host still Down".into(),
            })
        };
        let h = start(4, Arc::new(probe));
        h.control_tx
            .send(Message::status(Peer::Boss, Status::BeginTest))
            .unwrap();
        assert_eq!(h.handle.join().unwrap(), Some(4));
    }

    #[test]
    fn test_unexpected_messages_are_ignored_while_waiting() {
        let probe = |_: &str, _: Duration| -> Result<ProbeOutcome, ProbeError> {
            Ok(ProbeOutcome::Success)
        };
        let h = start(1, Arc::new(probe));
        let _ready = recv(&h.inbound_rx);

        h.control_tx.send(Message::quit(Peer::Boss, 9)).unwrap();
        h.control_tx
            .send(Message::status(Peer::Boss, Status::Ready))
            .unwrap();
        thread::sleep(Duration::from_millis(30));
        assert!(!h.handle.is_finished());

        h.control_tx
            .send(Message::status(Peer::Boss, Status::BeginTest))
            .unwrap();
        assert_eq!(h.handle.join().unwrap(), Some(0));
    }

    #[test]
    fn test_terminate_while_waiting_sends_no_quit() {
        let probe = |_: &str, _: Duration| -> Result<ProbeOutcome, ProbeError> {
            Ok(ProbeOutcome::Success)
        };
        let h = start(1, Arc::new(probe));
        let _ready = recv(&h.inbound_rx);

        h.terminate.store(true, Ordering::Relaxed);
        assert_eq!(h.handle.join().unwrap(), None);
        assert!(h.inbound_rx.try_iter().all(|m| !matches!(m, Message::Quit { .. })));
    }

    #[test]
    fn test_stale_control_messages_are_drained() {
        let (control_tx, control_rx) = bounded(4);
        let (inbound_tx, inbound_rx) = bounded(64);
        // Left over from an earlier run; must not release the worker.
        control_tx
            .send(Message::status(Peer::Boss, Status::BeginTest))
            .unwrap();

        let links = WorkerLinks {
            from_boss: control_rx,
            to_boss: inbound_tx,
            terminate: Arc::new(AtomicBool::new(false)),
        };
        let probe = |_: &str, _: Duration| -> Result<ProbeOutcome, ProbeError> {
            Ok(ProbeOutcome::Success)
        };
        let agent = WorkerAgent::new(WorkerId(1), settings(1), Arc::new(probe), links);
        let handle = thread::spawn(move || agent.run());

        let _ready = recv(&inbound_rx);
        thread::sleep(Duration::from_millis(30));
        assert!(!handle.is_finished());

        drop(control_tx);
        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn test_panic_in_probe_propagates() {
        let probe = |_: &str, _: Duration| -> Result<ProbeOutcome, ProbeError> {
            panic!("probe blew up")
        };
        let h = start(2, Arc::new(probe));
        h.control_tx
            .send(Message::status(Peer::Boss, Status::BeginTest))
            .unwrap();

        let payload = h.handle.join().unwrap_err();
        assert_eq!(panic_reason(payload.as_ref()), "probe blew up");
    }
}
