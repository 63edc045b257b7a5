//! End-to-end runs of the boss with real worker agents.
//!
//! Tests cover:
//! - Release barrier (exactly one broadcast, pool sizes 1..N)
//! - Error counting (always failing, exhausted retries, mixed pools)
//! - Run summary contents
//! - Per-worker log files
//! - Reproducible simulated runs

mod common;
use common::{always, failing_for, quick_config, CountingProbe};

use anyhow::{anyhow, Result};
use lockstep::probe::{Probe, ProbeError, ProbeOutcome, SimulatedProbe};
use lockstep::{Boss, PoolConfig, ShutdownOutcome, WorkerId};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// 1. Release barrier
// ============================================================================

#[test]
fn test_release_is_broadcast_once_for_every_pool_size() -> Result<()> {
    for workers in 1..=6 {
        let mut boss = Boss::new(quick_config(workers, 1), always(ProbeOutcome::Success))?;
        let summary = boss.run()?;

        assert_eq!(boss.releases_sent(), 1, "pool of {}", workers);
        assert_eq!(boss.ready_count(), workers as usize);
        assert_eq!(boss.quit_count(), workers as usize);
        assert_eq!(summary.results.len(), workers as usize);
    }
    Ok(())
}

#[test]
fn test_every_worker_runs_exactly_its_cycles() -> Result<()> {
    let probe = CountingProbe::default();
    let mut boss = Boss::new(quick_config(4, 3), Arc::new(probe.clone()))?;
    boss.run()?;

    for id in 1..=4 {
        assert_eq!(probe.calls_for(id), 3, "worker {}", id);
    }
    Ok(())
}

// ============================================================================
// 2. Scenarios
// ============================================================================

#[test]
fn test_three_workers_all_pass() -> Result<()> {
    let mut boss = Boss::new(quick_config(3, 2), always(ProbeOutcome::Success))?;
    let summary = boss.run()?;

    assert!(summary.passed());
    assert_eq!(summary.cycles, 2);
    let ids: Vec<WorkerId> = summary.results.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![WorkerId(1), WorkerId(2), WorkerId(3)]);
    for result in &summary.results {
        assert_eq!(result.error_count, Some(0));
        assert_eq!(result.shutdown, ShutdownOutcome::Exited);
    }
    assert_eq!(boss.live_workers(), 0);
    Ok(())
}

#[test]
fn test_one_failing_worker_does_not_stop_the_run() -> Result<()> {
    let mut boss = Boss::new(quick_config(3, 2), failing_for(&[2]))?;
    let summary = boss.run()?;

    assert!(!summary.passed());
    assert_eq!(summary.error_count(WorkerId(1)), Some(0));
    assert_eq!(summary.error_count(WorkerId(2)), Some(2));
    assert_eq!(summary.error_count(WorkerId(3)), Some(0));

    let failed: Vec<WorkerId> = summary.failed_workers().map(|r| r.id).collect();
    assert_eq!(failed, vec![WorkerId(2)]);
    Ok(())
}

#[test]
fn test_always_failing_probe_counts_every_cycle() -> Result<()> {
    let mut boss = Boss::new(quick_config(2, 5), always(ProbeOutcome::Failure))?;
    let summary = boss.run()?;

    for result in &summary.results {
        assert_eq!(result.error_count, Some(5));
    }
    Ok(())
}

#[test]
fn test_exhausted_retries_count_like_failures() -> Result<()> {
    let probe = |_: &str, _: Duration| -> Result<ProbeOutcome, ProbeError> {
        Err(ProbeError::RetriesExhausted {
            attempts: 2,
            elapsed: Duration::from_millis(1),
            last: "Host still Down".into(),
        })
    };
    let mut boss = Boss::new(quick_config(2, 3), Arc::new(probe))?;
    let summary = boss.run()?;

    assert_eq!(summary.error_count(WorkerId(1)), Some(3));
    assert_eq!(summary.error_count(WorkerId(2)), Some(3));
    Ok(())
}

#[test]
fn test_custom_worker_ids_are_reported() -> Result<()> {
    let config = PoolConfig {
        worker_ids: vec![WorkerId(7), WorkerId(3), WorkerId(11)],
        ..quick_config(0, 1)
    };
    let mut boss = Boss::new(config, failing_for(&[11]))?;
    let summary = boss.run()?;

    let ids: Vec<WorkerId> = summary.results.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![WorkerId(3), WorkerId(7), WorkerId(11)]);
    assert_eq!(summary.error_count(WorkerId(11)), Some(1));
    Ok(())
}

// ============================================================================
// 3. Logging
// ============================================================================

#[test]
fn test_each_worker_writes_its_own_log_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = PoolConfig {
        log_dir: Some(dir.path().to_path_buf()),
        ..quick_config(2, 2)
    };
    let mut boss = Boss::new(config, always(ProbeOutcome::Success))?;
    boss.run()?;

    for id in 1..=2 {
        let path = lockstep::logging::worker_log_path(dir.path(), WorkerId(id));
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| anyhow!("missing {}: {}", path.display(), e))?;
        assert!(contents.contains("Log Initialized"));
        assert!(contents.contains("Run Test"));
        assert!(contents.contains("Iteration:  2"));
        assert!(contents.contains("Send Quit to Boss"));
    }
    Ok(())
}

// ============================================================================
// 4. Simulated probe
// ============================================================================

#[test]
fn test_seeded_simulation_is_reproducible() -> Result<()> {
    let run = || -> Result<Vec<Option<u32>>> {
        let config = PoolConfig {
            seed: Some(1234),
            ..quick_config(4, 20)
        };
        let probe: Arc<dyn Probe> = Arc::new(SimulatedProbe::new(0.5, Duration::ZERO));
        let summary = Boss::new(config, probe)?.run()?;
        Ok(summary.results.iter().map(|r| r.error_count).collect())
    };

    let first = run()?;
    assert_eq!(first, run()?);
    assert!(first.iter().all(|errors| errors.is_some_and(|n| n <= 20)));
    Ok(())
}
