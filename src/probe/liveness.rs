use std::ffi::{OsStr, OsString};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::{self, Instant};
use tracing::debug;

use super::connect::connect;
use super::{Failure, ProbeStrategy};
use crate::error::ErrorKind;
use crate::resolve::{HostResolver, SystemResolver};
use crate::types::{ProbeMode, ProbeOutcome, Target};

/// Extra wall-clock allowance for the ping process beyond its own wait time.
const PING_GRACE: Duration = Duration::from_secs(1);

/// Decides whether a host is up. `Ok(())` means reachable.
#[async_trait]
pub trait HostLivenessChecker: Send + Sync {
    async fn check(&self, target: &Target, timeout: Duration) -> Result<(), Failure>;
}

/// Single-packet system `ping`.
#[derive(Debug, Clone)]
pub struct SystemPing {
    program: OsString,
}

impl SystemPing {
    /// Run `program` with ping's arguments instead of the `ping` found on `PATH`.
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SystemPing {
    fn default() -> Self {
        Self::with_program("ping")
    }
}

/// Platform-specific single-packet, bounded-wait `ping` invocation.
pub fn ping_command(program: impl AsRef<OsStr>, host: &str, timeout: Duration) -> Command {
    let mut cmd = Command::new(program);
    if cfg!(windows) {
        cmd.args(["-n", "1", "-w"]).arg(timeout.as_millis().max(1).to_string());
    } else if cfg!(target_os = "macos") {
        cmd.args(["-c", "1", "-W"]).arg(timeout.as_millis().max(1).to_string());
    } else {
        let secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
        cmd.args(["-c", "1", "-W"]).arg(secs.to_string());
    }
    cmd.arg(host);
    cmd
}

#[async_trait]
impl HostLivenessChecker for SystemPing {
    async fn check(&self, target: &Target, timeout: Duration) -> Result<(), Failure> {
        let mut cmd = ping_command(&self.program, &target.host, timeout);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        let mut child = cmd
            .spawn()
            .map_err(|e| Failure::new(ErrorKind::InternalError, format!("failed to run ping: {e}")))?;

        match time::timeout(timeout + PING_GRACE, child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(Failure::new(
                ErrorKind::ConnectError,
                format!("no reply ({status})"),
            )),
            Ok(Err(e)) => Err(Failure::new(
                ErrorKind::InternalError,
                format!("waiting for ping: {e}"),
            )),
            Err(_) => Err(Failure::new(
                ErrorKind::ConnectTimeout,
                format!("ping still running after {} ms", (timeout + PING_GRACE).as_millis()),
            )),
        }
    }
}

/// TCP connect to the target's port, for networks that drop ICMP.
///
/// Sweep targets carry the liveness port, so the port checked is always the
/// port reported.
#[derive(Clone)]
pub struct TcpLiveness {
    resolver: Arc<dyn HostResolver>,
}

impl TcpLiveness {
    pub fn new() -> Self {
        Self::with_resolver(Arc::new(SystemResolver))
    }

    pub fn with_resolver(resolver: Arc<dyn HostResolver>) -> Self {
        Self { resolver }
    }
}

impl Default for TcpLiveness {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostLivenessChecker for TcpLiveness {
    async fn check(&self, target: &Target, timeout: Duration) -> Result<(), Failure> {
        connect(self.resolver.as_ref(), &target.host, target.port, timeout)
            .await
            .map(drop)
    }
}

/// Host sweep strategy; reachability only, never a payload.
#[derive(Clone)]
pub struct LivenessProbe {
    checker: Arc<dyn HostLivenessChecker>,
}

impl LivenessProbe {
    pub fn new(checker: Arc<dyn HostLivenessChecker>) -> Self {
        Self { checker }
    }
}

#[async_trait]
impl ProbeStrategy for LivenessProbe {
    fn mode(&self) -> ProbeMode {
        ProbeMode::IcmpPing
    }

    async fn probe(&self, target: &Target, timeout: Duration) -> ProbeOutcome {
        let start = Instant::now();
        let res = self.checker.check(target, timeout).await;
        let elapsed = start.elapsed();
        match res {
            Ok(()) => ProbeOutcome::success(target.clone(), None, elapsed),
            Err(f) => {
                debug!(host = %target.host, error = %f.kind, "host not alive");
                f.into_outcome(target.clone(), elapsed)
            }
        }
    }
}
