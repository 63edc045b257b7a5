#![allow(dead_code)]

use lockstep::probe::{Probe, ProbeError, ProbeOutcome};
use lockstep::worker::thread::current_worker;
use lockstep::{Message, Peer, PoolConfig, Status, WorkerId, WorkerLinks};

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Pool configuration with short timeouts for tests.
pub fn quick_config(workers: u32, cycles: u32) -> PoolConfig {
    PoolConfig::builder()
        .target("device-under-test")
        .workers(workers)
        .cycles(cycles)
        .probe_timeout(Duration::from_millis(20))
        .worker_poll(Duration::from_millis(5))
        .grace_period(Duration::from_secs(5))
        .reap_timeout(Duration::from_millis(500))
        .build()
}

pub fn always(outcome: ProbeOutcome) -> Arc<dyn Probe> {
    Arc::new(move |_: &str, _: Duration| -> Result<ProbeOutcome, ProbeError> { Ok(outcome) })
}

/// Probe that fails for the listed workers and succeeds for everyone else.
pub fn failing_for(workers: &[u32]) -> Arc<dyn Probe> {
    let failing: Vec<WorkerId> = workers.iter().copied().map(WorkerId).collect();
    Arc::new(move |_: &str, _: Duration| -> Result<ProbeOutcome, ProbeError> {
        match current_worker() {
            Some(id) if failing.contains(&id) => Ok(ProbeOutcome::Failure),
            _ => Ok(ProbeOutcome::Success),
        }
    })
}

/// Probe that records how many times each worker called it.
#[derive(Clone, Default)]
pub struct CountingProbe {
    pub calls: Arc<Mutex<HashMap<WorkerId, u32>>>,
}

impl CountingProbe {
    pub fn calls_for(&self, id: u32) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(&WorkerId(id))
            .copied()
            .unwrap_or(0)
    }
}

impl Probe for CountingProbe {
    fn probe(&self, _target: &str, _timeout: Duration) -> Result<ProbeOutcome, ProbeError> {
        let id = current_worker().expect("probe called outside a worker thread");
        *self.calls.lock().unwrap().entry(id).or_insert(0) += 1;
        Ok(ProbeOutcome::Success)
    }
}

/// Hand-written worker that follows the protocol up to Quit, then keeps its
/// thread alive for `linger`. With `obey_terminate` it exits as soon as the
/// boss raises its terminate flag.
pub fn lingering_worker(
    id: WorkerId,
    links: WorkerLinks,
    linger: Duration,
    obey_terminate: bool,
) -> Option<u32> {
    let me = Peer::Worker(id);
    links.to_boss.send(Message::status(me, Status::Ready)).ok()?;

    loop {
        match links.from_boss.recv() {
            Ok(Message::Status {
                status: Status::BeginTest,
                ..
            }) => break,
            Ok(_) => continue,
            Err(_) => return None,
        }
    }

    links.to_boss.send(Message::quit(me, 0)).ok()?;

    let step = Duration::from_millis(1);
    let mut waited = Duration::ZERO;
    while waited < linger {
        if obey_terminate && links.terminate.load(Ordering::Relaxed) {
            break;
        }
        thread::sleep(step);
        waited += step;
    }
    Some(0)
}

/// Worker that never announces itself and waits to be terminated.
pub fn silent_worker(links: WorkerLinks) -> Option<u32> {
    while !links.terminate.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(1));
    }
    None
}
