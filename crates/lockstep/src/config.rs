//! src/config.rs
//!
//! Configuration for one run of the pool.
//!
//! The `PoolConfig` struct is fixed for the whole run: which worker slots exist,
//! what they probe, how many times, and how patient the boss is with them.
//!
//! Example:
//! ```ignore
//! let config = PoolConfig::builder()
//!     .target("192.168.0.201")
//!     .workers(4)
//!     .cycles(10)
//!     .grace_period(Duration::from_secs(100))
//!     .build();
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::message::WorkerId;

/// Largest per-worker channel capacity accepted. Bounded channels allocate
/// their whole buffer up front.
pub const MAX_CHANNEL_CAPACITY: usize = 1 << 16;

/// Configuration for the boss and its workers
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Worker slots, in spawn order (defaults to 1..=16)
    pub worker_ids: Vec<WorkerId>,
    /// Address or resource every worker probes
    pub target: String,
    /// Test iterations per worker
    pub cycles: u32,
    /// Timeout handed to the probe on every iteration
    pub probe_timeout: Duration,
    /// How long the boss waits on the inbound channel before re-checking its
    /// counters. Not an error timeout.
    pub recv_timeout: Duration,
    /// How often a waiting worker re-checks its terminate flag
    pub worker_poll: Duration,
    /// Time a quitting worker gets to exit on its own
    pub grace_period: Duration,
    /// Time a terminated worker gets before its thread is detached
    pub reap_timeout: Duration,
    /// Capacity of the channels, per worker
    pub channel_capacity: usize,
    /// Directory for Worker_{id}.log files; workers log through the global
    /// subscriber when unset
    pub log_dir: Option<PathBuf>,
    /// Base seed for per-worker randomness
    pub seed: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_ids: (1..=16).map(WorkerId).collect(),
            target: String::new(),
            cycles: 10,
            probe_timeout: Duration::from_secs(2),
            recv_timeout: Duration::from_millis(1),
            worker_poll: Duration::from_millis(100),
            grace_period: Duration::from_secs(100),
            reap_timeout: Duration::from_secs(1),
            channel_capacity: 64,
            log_dir: None,
            seed: None,
        }
    }
}

impl PoolConfig {
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    pub fn pool_size(&self) -> usize {
        self.worker_ids.len()
    }

    /// Capacity of the shared inbound channel: `channel_capacity` per worker.
    pub fn inbound_capacity(&self) -> Result<usize> {
        self.channel_capacity
            .checked_mul(self.pool_size())
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "channel_capacity {} x {} workers overflows",
                    self.channel_capacity,
                    self.pool_size()
                ))
            })
    }

    /// Check the configuration before any thread is spawned.
    pub fn validate(&self) -> Result<()> {
        if self.worker_ids.is_empty() {
            return Err(Error::InvalidConfig(
                "pool has no workers; at least one worker id is required".into(),
            ));
        }

        let mut seen = HashSet::with_capacity(self.worker_ids.len());
        for id in &self.worker_ids {
            if !seen.insert(id) {
                return Err(Error::InvalidConfig(format!(
                    "worker id {} is assigned twice",
                    id.0
                )));
            }
        }

        if self.cycles == 0 {
            return Err(Error::InvalidConfig("cycles must be > 0".into()));
        }

        if self.target.trim().is_empty() {
            return Err(Error::InvalidConfig("target must not be empty".into()));
        }

        if self.channel_capacity == 0 {
            return Err(Error::InvalidConfig(
                "channel_capacity must be > 0 to prevent deadlocks".into(),
            ));
        }

        if self.channel_capacity > MAX_CHANNEL_CAPACITY {
            return Err(Error::InvalidConfig(format!(
                "channel_capacity {} exceeds the maximum of {}",
                self.channel_capacity, MAX_CHANNEL_CAPACITY
            )));
        }
        self.inbound_capacity()?;

        Ok(())
    }
}

/// Builder for PoolConfig with method chaining
#[derive(Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Use worker ids 1..=count
    pub fn workers(mut self, count: u32) -> Self {
        self.config.worker_ids = (1..=count).map(WorkerId).collect();
        self
    }

    /// Use an explicit list of worker ids
    pub fn worker_ids<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<WorkerId>,
    {
        self.config.worker_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.config.target = target.into();
        self
    }

    pub fn cycles(mut self, cycles: u32) -> Self {
        self.config.cycles = cycles;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    /// Set the boss polling interval
    ///
    /// - Too low: more wakeups while the pool is idle.
    /// - Too high: slower reaction to the ready barrier and to quits.
    pub fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.config.recv_timeout = timeout;
        self
    }

    pub fn worker_poll(mut self, interval: Duration) -> Self {
        self.config.worker_poll = interval;
        self
    }

    /// Set the shutdown grace period.
    ///
    /// Too short and a worker may be cut off in the middle of a probe.
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.config.grace_period = grace;
        self
    }

    pub fn reap_timeout(mut self, timeout: Duration) -> Self {
        self.config.reap_timeout = timeout;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = Some(dir.into());
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> PoolConfig {
        self.config
    }
}
