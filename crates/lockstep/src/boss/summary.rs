//! Per-worker results of a finished run.

use std::fmt;

use super::handle::ShutdownOutcome;
use crate::message::WorkerId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerResult {
    pub id: WorkerId,
    /// Count carried by the worker's Quit; `None` when it never sent one.
    pub error_count: Option<u32>,
    pub shutdown: ShutdownOutcome,
    /// Panic message of a worker that died before quitting.
    pub panic: Option<String>,
}

impl WorkerResult {
    pub fn passed(&self) -> bool {
        self.error_count == Some(0)
    }

    fn count_text(&self) -> String {
        match self.error_count {
            Some(count) => format!("{:>3}", count),
            None => "  -".to_string(),
        }
    }
}

/// Outcome of a run, ordered by worker id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u32,
    pub results: Vec<WorkerResult>,
}

impl RunSummary {
    /// True when every worker quit with zero errors.
    pub fn passed(&self) -> bool {
        self.results.iter().all(WorkerResult::passed)
    }

    pub fn error_count(&self, id: WorkerId) -> Option<u32> {
        self.results
            .iter()
            .find(|r| r.id == id)
            .and_then(|r| r.error_count)
    }

    pub fn result(&self, id: WorkerId) -> Option<&WorkerResult> {
        self.results.iter().find(|r| r.id == id)
    }

    pub fn failed_workers(&self) -> impl Iterator<Item = &WorkerResult> + '_ {
        self.results.iter().filter(|r| !r.passed())
    }

    /// Write the summary to the log: clean workers at INFO, the rest at ERROR.
    pub fn log(&self) {
        tracing::info!("Results for {} cycles", self.cycles);
        for result in &self.results {
            if result.passed() {
                tracing::info!("\tworker:{}, error_count:{}", result.id, result.count_text());
            } else if result.error_count.is_some() {
                tracing::error!("\tworker:{}, error_count:{}", result.id, result.count_text());
            } else {
                tracing::error!(
                    "\tworker:{}, error_count:{} ({})",
                    result.id,
                    result.count_text(),
                    result.shutdown
                );
            }
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Results for {} cycles", self.cycles)?;
        for result in &self.results {
            writeln!(
                f,
                "\tworker:{}, error_count:{} ({})",
                result.id,
                result.count_text(),
                result.shutdown
            )?;
        }
        Ok(())
    }
}
