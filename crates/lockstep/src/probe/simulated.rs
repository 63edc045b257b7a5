//! src/probe/simulated.rs
//!
//! Probe that never touches the network. Used for dry runs of the harness.
//! Failures are drawn from the worker's RNG, so a seeded pool reproduces the
//! same error counts.

use std::thread;
use std::time::Duration;

use super::{Probe, ProbeError, ProbeOutcome};
use crate::worker::thread::worker_gen_bool;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedProbe {
    /// Probability that one probe call fails.
    pub failure_probability: f64,
    /// Time spent per probe call, capped by the probe timeout.
    pub latency: Duration,
}

impl SimulatedProbe {
    pub fn new(failure_probability: f64, latency: Duration) -> Self {
        Self {
            failure_probability,
            latency,
        }
    }
}

impl Default for SimulatedProbe {
    fn default() -> Self {
        Self::new(0.0, Duration::from_millis(10))
    }
}

impl Probe for SimulatedProbe {
    fn probe(&self, target: &str, timeout: Duration) -> Result<ProbeOutcome, ProbeError> {
        thread::sleep(self.latency.min(timeout));
        if worker_gen_bool(self.failure_probability) {
            tracing::debug!(host = target, "simulated probe failure");
            Ok(ProbeOutcome::Failure)
        } else {
            Ok(ProbeOutcome::Success)
        }
    }
}
