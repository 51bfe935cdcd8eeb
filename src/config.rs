use std::collections::BTreeSet;
use std::time::Duration;

use crate::types::ProbeMode;

/// Ports that get TLS-wrapped by the banner probe unless TLS is forced.
pub const DEFAULT_TLS_PORTS: &[u16] = &[443, 8443];

/// Ports that receive a `HEAD /` request before the banner read.
pub const DEFAULT_HTTP_PORTS: &[u16] = &[80, 443, 8000, 8080, 8443];

/// Port probed by the TCP liveness fallback.
pub const DEFAULT_LIVENESS_PORT: u16 = 80;

/// Maximum number of banner bytes read from a target.
pub const BANNER_BUF_SIZE: usize = 4096;

/// How the ping sweep decides a host is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LivenessMethod {
    /// Shell out to the platform `ping` utility.
    #[default]
    SystemPing,
    /// TCP connect to a fixed port.
    Tcp { port: u16 },
}

#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub send_http_probe: bool,
    pub force_tls: bool,
    pub http_ports: BTreeSet<u16>,
    pub tls_ports: BTreeSet<u16>,
    pub liveness: LivenessMethod,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            send_http_probe: true,
            force_tls: false,
            http_ports: DEFAULT_HTTP_PORTS.iter().copied().collect(),
            tls_ports: DEFAULT_TLS_PORTS.iter().copied().collect(),
            liveness: LivenessMethod::default(),
        }
    }
}

/// Everything the scheduler and the default strategies need for one run.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub mode: ProbeMode,
    /// Connect (or ping) timeout per probe.
    pub timeout: Duration,
    /// Banner read timeout, only used by `TcpBanner`.
    pub read_timeout: Duration,
    pub worker_limit: usize,
    /// Pause after each probe before its worker slot is reused.
    pub delay: Duration,
    /// Overall wall-clock budget; targets not dispatched by then are reported
    /// as internal errors.
    pub deadline: Option<Duration>,
    pub options: ProbeOptions,
}

impl ScanConfig {
    pub fn for_mode(mode: ProbeMode) -> Self {
        let (timeout, worker_limit, delay) = match mode {
            ProbeMode::TcpConnect => (Duration::from_millis(500), 100, Duration::ZERO),
            ProbeMode::TcpBanner => (Duration::from_secs(2), 50, Duration::ZERO),
            ProbeMode::IcmpPing => (Duration::from_secs(1), 100, Duration::from_millis(20)),
        };
        Self {
            mode,
            timeout,
            read_timeout: timeout,
            worker_limit,
            delay,
            deadline: None,
            options: ProbeOptions::default(),
        }
    }

    /// Port recorded in the report for TCP-fallback sweeps.
    pub fn liveness_port(&self) -> Option<u16> {
        match (self.mode, self.options.liveness) {
            (ProbeMode::IcmpPing, LivenessMethod::Tcp { port }) => Some(port),
            _ => None,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::for_mode(ProbeMode::TcpConnect)
    }
}
