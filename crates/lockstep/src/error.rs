//! src/error.rs
//!
//! Errors surfaced by the coordinator.
//!
//! Worker-side failures never show up here. Probe failures and exhausted retries
//! are folded into the worker's error count, and a worker that dies without
//! quitting is recorded in the run summary. Only conditions that stop the whole
//! run are represented.

use crate::message::WorkerId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn worker {id}")]
    Spawn {
        id: WorkerId,
        #[source]
        source: std::io::Error,
    },

    #[error("run aborted (ready {ready}/{pool}, quit {quit}/{pool})")]
    Aborted { ready: usize, quit: usize, pool: usize },

    #[error("inbound channel closed with {quit}/{pool} workers quit")]
    ChannelClosed { quit: usize, pool: usize },

    #[error("failed to set up logging: {0}")]
    Logging(String),
}
