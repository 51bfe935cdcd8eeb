use std::cmp::Ordering;
use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ScanError};

/// Which probe strategy a target is meant for.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMode {
    TcpConnect,
    TcpBanner,
    IcmpPing,
}

impl ProbeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeMode::TcpConnect => "tcp_connect",
            ProbeMode::TcpBanner => "tcp_banner",
            ProbeMode::IcmpPing => "icmp_ping",
        }
    }

    /// Host sweeps are ordered by address, everything else by port.
    pub fn is_host_sweep(&self) -> bool {
        matches!(self, ProbeMode::IcmpPing)
    }
}

impl std::fmt::Display for ProbeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One host/port pair to probe.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub mode: ProbeMode,
}

impl Target {
    /// Returns `None` for port 0, which is never a valid probe port.
    pub fn new(host: impl Into<String>, port: u16, mode: ProbeMode) -> Option<Self> {
        if port == 0 {
            return None;
        }
        Some(Self {
            host: host.into(),
            port,
            mode,
        })
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn endpoint(&self) -> String {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => format!("[{}]:{}", v6, self.port),
            _ => format!("{}:{}", self.host, self.port),
        }
    }

    /// Deterministic report ordering: `(port, host)` for port scans and
    /// `(host, port)` for host sweeps.
    pub fn canonical_cmp(&self, other: &Target) -> Ordering {
        let by_port = self.port.cmp(&other.port);
        let by_host = host_key(&self.host).cmp(&host_key(&other.host));
        if self.mode.is_host_sweep() {
            by_host.then(by_port)
        } else {
            by_port.then(by_host)
        }
    }
}

// Variant order matters: IPv4 literals, then IPv6 literals, then names.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum HostKey<'a> {
    V4(u32),
    V6(u128),
    Name(&'a str),
}

fn host_key(host: &str) -> HostKey<'_> {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => HostKey::V4(u32::from(v4)),
        Ok(IpAddr::V6(v6)) => HostKey::V6(u128::from(v6)),
        Err(_) => HostKey::Name(host),
    }
}

/// Result of probing a single target. Produced exactly once per target.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub target: Target,
    pub succeeded: bool,
    pub payload: Option<String>,
    pub error: Option<ErrorKind>,
    pub detail: Option<String>,
    #[serde(rename = "elapsed_ms", with = "elapsed_ms")]
    pub elapsed: Duration,
}

impl ProbeOutcome {
    pub fn success(target: Target, payload: Option<String>, elapsed: Duration) -> Self {
        Self {
            target,
            succeeded: true,
            payload,
            error: None,
            detail: None,
            elapsed,
        }
    }

    pub fn failure(
        target: Target,
        error: ErrorKind,
        detail: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            target,
            succeeded: false,
            payload: None,
            error: Some(error),
            detail: Some(detail.into()),
            elapsed,
        }
    }

    /// Outcome synthesized by the scheduler when a probe never reported back.
    pub fn internal(target: Target, detail: impl Into<String>) -> Self {
        Self::failure(target, ErrorKind::InternalError, detail, Duration::ZERO)
    }
}

mod elapsed_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Aggregated, sorted results of one scan invocation.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScanReport {
    pub subnet_or_host: String,
    pub mode: ProbeMode,
    pub timeout_sec: f64,
    pub read_timeout_sec: Option<f64>,
    pub worker_limit: usize,
    pub delay_sec: f64,
    pub tcp_port: Option<u16>,
    pub targets_requested: usize,
    pub scanned_at: String,
    pub completed_at: String,
    pub outcomes: Vec<ProbeOutcome>,
}

impl ScanReport {
    /// Sort outcomes canonically and check that every requested target has
    /// exactly one outcome.
    pub fn finalize(mut self, completed_at: String) -> Result<Self, ScanError> {
        self.outcomes
            .sort_by(|a, b| a.target.canonical_cmp(&b.target));
        self.completed_at = completed_at;
        if self.outcomes.len() != self.targets_requested {
            return Err(ScanError::OutcomeCountMismatch {
                requested: self.targets_requested,
                outcomes: self.outcomes.len(),
            });
        }
        Ok(self)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ProbeOutcome> {
        self.outcomes.iter().filter(|o| o.succeeded)
    }

    pub fn succeeded_count(&self) -> usize {
        self.succeeded().count()
    }
}
