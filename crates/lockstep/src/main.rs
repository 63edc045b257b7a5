use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use lockstep::logging;
use lockstep::probe::{Expect, PingProbe, Probe, SimulatedProbe};
use lockstep::{Boss, PoolConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExpectArg {
    Up,
    Down,
}

/// Release a pool of workers against one device and report per-worker errors.
#[derive(Debug, Parser)]
#[command(name = "lockstep", version)]
struct Args {
    /// Address of the device under test
    #[arg(short = 'i', long, alias = "ipv4")]
    target: String,

    /// Number of workers, with ids 1..=N
    #[arg(short, long, default_value_t = 16, conflicts_with = "ids")]
    workers: u32,

    /// Explicit worker ids, comma separated
    #[arg(long, value_delimiter = ',')]
    ids: Vec<u32>,

    /// Probe iterations per worker
    #[arg(short, long, default_value_t = 10)]
    cycles: u32,

    /// Network interface for link-local IPv6 targets
    #[arg(long)]
    interface: Option<String>,

    /// State every probe waits for
    #[arg(long, value_enum, default_value_t = ExpectArg::Up)]
    expect: ExpectArg,

    /// Use a simulated probe failing with this probability instead of ping
    #[arg(long)]
    simulate: Option<f64>,

    /// Seed for simulated failures
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value_t = 2)]
    probe_timeout_secs: u64,

    /// Time a quitting worker gets before it is terminated
    #[arg(long, default_value_t = 100)]
    grace_period_secs: u64,

    /// Directory for Boss_stdout.log and Worker_{id}.log
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Abort the run if it has not finished after this many seconds
    #[arg(long)]
    deadline_secs: Option<u64>,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let _log_guard = logging::init_boss(args.log_dir.as_deref()).context("Failed to set up logging")?;
    tracing::info!("Start Log");

    let mut builder = PoolConfig::builder()
        .target(&args.target)
        .cycles(args.cycles)
        .probe_timeout(Duration::from_secs(args.probe_timeout_secs))
        .grace_period(Duration::from_secs(args.grace_period_secs));
    builder = if args.ids.is_empty() {
        builder.workers(args.workers)
    } else {
        builder.worker_ids(args.ids.iter().copied())
    };
    if let Some(dir) = &args.log_dir {
        builder = builder.log_dir(dir);
    }
    if let Some(seed) = args.seed {
        builder = builder.seed(seed);
    }
    let config = builder.build();

    let probe: Arc<dyn Probe> = match args.simulate {
        Some(rate) => Arc::new(SimulatedProbe::new(rate, Duration::from_millis(50))),
        None => {
            let expect = match args.expect {
                ExpectArg::Up => Expect::Up,
                ExpectArg::Down => Expect::Down,
            };
            let mut ping = PingProbe::new(expect);
            if let Some(interface) = &args.interface {
                ping = ping.with_interface(interface);
            }
            Arc::new(ping)
        }
    };

    let mut boss = Boss::new(config, probe).context("Failed to start worker pool")?;

    if let Some(secs) = args.deadline_secs {
        let abort = boss.abort_handle();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(secs));
            abort.abort();
        });
    }

    let summary = boss.run().context("Run did not complete")?;
    summary.log();

    Ok(if summary.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
