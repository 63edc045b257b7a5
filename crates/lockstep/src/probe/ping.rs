//! src/probe/ping.rs
//!
//! Probe that shells out to the platform `ping` / `ping6` binary.
//!
//! A probe call waits for the target to reach the expected state (answering
//! pings, or no longer answering them), retrying according to a
//! [`RetryPolicy`]. Running out of retries is reported as
//! [`ProbeError::RetriesExhausted`].

use std::net::IpAddr;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use super::{Probe, ProbeError, ProbeOutcome, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    /// Infer the version from a textual address. Host names are treated as IPv4.
    pub fn of(target: &str) -> Self {
        let address = target.split('%').next().unwrap_or(target);
        match address.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => IpVersion::V6,
            _ => IpVersion::V4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    MacOs,
    Windows,
}

impl Os {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Os::Windows
        } else if cfg!(target_os = "macos") {
            Os::MacOs
        } else {
            Os::Linux
        }
    }
}

/// State the probe waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Up,
    Down,
}

/// Result of one `ping_once` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingReply {
    pub answered: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct PingProbe {
    expect: Expect,
    interface: Option<String>,
    packets: u32,
    retry: RetryPolicy,
    os: Os,
}

impl PingProbe {
    pub fn new(expect: Expect) -> Self {
        let retry = match expect {
            Expect::Up => RetryPolicy::until_up(),
            Expect::Down => RetryPolicy::until_down(),
        };
        Self {
            expect,
            interface: None,
            packets: 1,
            retry,
            os: Os::current(),
        }
    }

    /// Local network interface used to scope link-local IPv6 targets.
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    pub fn with_packets(mut self, packets: u32) -> Self {
        self.packets = packets.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build the ping command line for `os`.
    ///
    /// Returns `None` when the combination cannot be expressed, e.g. IPv6 on
    /// macOS without an interface.
    pub fn command_line(
        os: Os,
        target: &str,
        interface: Option<&str>,
        timeout: Duration,
        packets: u32,
    ) -> Option<Vec<String>> {
        let version = IpVersion::of(target);
        let secs = timeout.as_secs().max(1).to_string();
        let count = packets.to_string();

        // `addr%iface` unless the caller already scoped the address
        let scoped = |iface: Option<&str>| match iface {
            Some(iface) if !target.contains('%') => Some(format!("{}%{}", target, iface)),
            _ if target.contains('%') => Some(target.to_string()),
            _ => None,
        };

        let args: Vec<String> = match (os, version) {
            (Os::Linux, IpVersion::V4) => {
                vec!["ping".into(), "-c".into(), count, "-W".into(), secs, target.into()]
            }
            (Os::Linux, IpVersion::V6) => {
                let address = scoped(interface).unwrap_or_else(|| target.to_string());
                vec!["ping6".into(), "-c".into(), count, address]
            }
            (Os::MacOs, IpVersion::V4) => {
                vec!["ping".into(), "-c".into(), count, "-t".into(), secs, target.into()]
            }
            (Os::MacOs, IpVersion::V6) => {
                let iface = interface?;
                vec![
                    "ping6".into(),
                    "-c".into(),
                    count,
                    "-I".into(),
                    iface.into(),
                    target.into(),
                ]
            }
            (Os::Windows, version) => {
                let millis = timeout.as_millis().max(1).to_string();
                let mut args = vec!["ping".to_string()];
                let address = if version == IpVersion::V6 {
                    args.push("-6".into());
                    scoped(interface)?
                } else {
                    target.to_string()
                };
                args.extend(["-n".into(), count, "-w".into(), millis, address]);
                args
            }
        };
        Some(args)
    }

    /// Run ping until the target answers or `timeout` elapses.
    pub fn ping_once(&self, target: &str, timeout: Duration) -> Result<PingReply, ProbeError> {
        let args = Self::command_line(
            self.os,
            target,
            self.interface.as_deref(),
            timeout,
            self.packets,
        )
        .ok_or_else(|| {
            ProbeError::Unsupported(format!(
                "cannot ping {} on {:?} without a network interface",
                target, self.os
            ))
        })?;

        let start = Instant::now();
        loop {
            let output = Command::new(&args[0])
                .args(&args[1..])
                .stdin(Stdio::null())
                .stderr(Stdio::null())
                .output()
                .map_err(|source| ProbeError::Spawn {
                    command: args.join(" "),
                    source,
                })?;
            tracing::debug!(
                stdout = %String::from_utf8_lossy(&output.stdout).trim(),
                status = ?output.status.code(),
                "ping finished"
            );

            let elapsed = start.elapsed();
            if output.status.success() {
                return Ok(PingReply {
                    answered: true,
                    elapsed,
                });
            }
            if elapsed >= timeout {
                return Ok(PingReply {
                    answered: false,
                    elapsed,
                });
            }
        }
    }
}

impl Probe for PingProbe {
    fn probe(&self, target: &str, timeout: Duration) -> Result<ProbeOutcome, ProbeError> {
        let start = Instant::now();
        let attempts = self.retry.run(|| {
            let reply = self.ping_once(target, timeout)?;
            let reached = match self.expect {
                Expect::Up => reply.answered,
                Expect::Down => !reply.answered,
            };
            if reached {
                Ok(None)
            } else {
                let state = if reply.answered { "Up" } else { "Down" };
                Ok(Some(format!(
                    "Host still {} after {:.2?}: {}",
                    state,
                    start.elapsed(),
                    target
                )))
            }
        })?;

        tracing::debug!(
            host = target,
            attempts,
            expect = ?self.expect,
            "host reached expected state after {:.2?}",
            start.elapsed()
        );
        Ok(ProbeOutcome::Success)
    }
}
