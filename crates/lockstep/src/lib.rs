//! Release a pool of probe workers against one target in lockstep.
//!
//! A [`Boss`] spawns one thread per worker. Every worker announces that it is
//! ready and then blocks; once all of them are ready the boss releases them at
//! the same moment. Each worker then probes the target a fixed number of times,
//! counts failures and quits with its error count. The boss collects the counts
//! into a [`RunSummary`], shutting each worker down as it quits.
//!
//! ```ignore
//! let config = PoolConfig::builder()
//!     .target("192.168.0.201")
//!     .workers(4)
//!     .cycles(10)
//!     .build();
//!
//! let probe = Arc::new(PingProbe::new(Expect::Up));
//! let summary = Boss::new(config, probe)?.run()?;
//! summary.log();
//! ```

pub mod boss;
pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod probe;
pub mod worker;

pub use boss::{AbortHandle, Boss, RunSummary, ShutdownOutcome, WorkerResult};
pub use config::{PoolConfig, PoolConfigBuilder};
pub use error::{Error, Result};
pub use message::{Message, MessageHandler, Peer, Status, WorkerId};
pub use probe::{Probe, ProbeError, ProbeOutcome};
pub use worker::{WorkerAgent, WorkerLinks, WorkerSettings};
