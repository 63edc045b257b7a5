//! src/probe/retry.rs
//!
//! Bounded "retry until the state changes" loop.
//!
//! A probe attempt either observes the expected state (`Ok(None)`) or reports
//! why it did not (`Ok(Some(reason))`). The policy keeps retrying with a fixed
//! wait until the expected state is seen, the attempt budget is used up, or the
//! overall deadline passes. Hard errors from an attempt are returned unchanged.

use std::thread;
use std::time::{Duration, Instant};

use super::ProbeError;

/// Retry budget for a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Stop once this much time has passed since the first attempt.
    pub max_delay: Duration,
    /// Pause between two attempts.
    pub wait: Duration,
    /// Stop after this many attempts.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Budget used while waiting for a target to come up.
    pub fn until_up() -> Self {
        Self {
            max_delay: Duration::from_secs(60),
            wait: Duration::from_millis(200),
            max_attempts: 300,
        }
    }

    /// Budget used while waiting for a target to go down.
    pub fn until_down() -> Self {
        Self {
            max_delay: Duration::from_secs(40),
            wait: Duration::from_millis(200),
            max_attempts: 200,
        }
    }

    /// Run `attempt` until it reports the expected state.
    ///
    /// Returns the number of attempts it took.
    pub fn run<F>(&self, mut attempt: F) -> Result<u32, ProbeError>
    where
        F: FnMut() -> Result<Option<String>, ProbeError>,
    {
        let start = Instant::now();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let last = match attempt()? {
                None => return Ok(attempts),
                Some(reason) => reason,
            };
            tracing::debug!(attempts, %last, "probe attempt did not reach expected state");

            let elapsed = start.elapsed();
            if attempts >= self.max_attempts || elapsed + self.wait > self.max_delay {
                return Err(ProbeError::RetriesExhausted {
                    attempts,
                    elapsed,
                    last,
                });
            }
            thread::sleep(self.wait);
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::until_up()
    }
}
