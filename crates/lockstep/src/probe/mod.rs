//! src/probe/mod.rs
//!
//! The operation a worker performs on every test iteration.
//!
//! Workers only care about two things: did the target reach the expected state
//! (`ProbeOutcome`), and if the probe could not even produce an answer, why
//! (`ProbeError`). Both a `Failure` outcome and any `ProbeError` count as one
//! error for the worker.
//!
//! # Module Structure
//!
//! ```text
//! src/probe/
//! ├── mod.rs         # Probe trait, outcome and error types
//! ├── retry.rs       # RetryPolicy: retry until the target changes state
//! ├── ping.rs        # PingProbe: platform ping/ping6 command
//! └── simulated.rs   # SimulatedProbe: random failures for dry runs
//! ```

use std::time::Duration;

pub mod ping;
pub mod retry;
pub mod simulated;

pub use ping::{Expect, IpVersion, Os, PingProbe};
pub use retry::RetryPolicy;
pub use simulated::SimulatedProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success,
    Failure,
}

impl ProbeOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, ProbeOutcome::Success)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The retry budget ran out before the target reached the expected state.
    #[error("retries exhausted after {attempts} attempts in {elapsed:?}: {last}")]
    RetriesExhausted {
        attempts: u32,
        elapsed: Duration,
        last: String,
    },

    #[error("failed to run probe command `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("probe not supported: {0}")]
    Unsupported(String),
}

/// A health check against a target.
///
/// Implementations must be shareable between worker threads.
pub trait Probe: Send + Sync {
    fn probe(&self, target: &str, timeout: Duration) -> Result<ProbeOutcome, ProbeError>;
}

impl<F> Probe for F
where
    F: Fn(&str, Duration) -> Result<ProbeOutcome, ProbeError> + Send + Sync,
{
    fn probe(&self, target: &str, timeout: Duration) -> Result<ProbeOutcome, ProbeError> {
        self(target, timeout)
    }
}
