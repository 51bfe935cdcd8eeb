use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::DEFAULT_LIVENESS_PORT;
use crate::error::TargetError;
use crate::netdetect;
use crate::ports;
use crate::types::{ProbeMode, Target};

/// Port assumed for target-file lines that name only a host.
pub const DEFAULT_TARGET_PORT: u16 = 80;

/// Compact description of what to probe, expanded by [`enumerate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// One host and an inline port specification (`None` means 1-100).
    HostPorts { host: String, ports: Option<String> },
    /// File with one `host[:port]` per line.
    File(PathBuf),
    /// Every host address of a subnet, each paired with `port`.
    Subnet { subnet: String, port: u16 },
}

impl TargetSpec {
    pub fn subnet(subnet: impl Into<String>) -> Self {
        TargetSpec::Subnet {
            subnet: subnet.into(),
            port: DEFAULT_LIVENESS_PORT,
        }
    }

    /// Value used for the report's `subnet_or_host` field.
    pub fn label(&self) -> String {
        match self {
            TargetSpec::HostPorts { host, .. } => host.clone(),
            TargetSpec::File(path) => path.display().to_string(),
            TargetSpec::Subnet { subnet, .. } => netdetect::parse_subnet(subnet)
                .map(|n| n.to_string())
                .unwrap_or_else(|_| subnet.clone()),
        }
    }
}

/// Expand a specification into an ordered, duplicate-free target list.
///
/// Any malformed entry or unreadable file aborts the whole expansion.
pub fn enumerate(spec: &TargetSpec, mode: ProbeMode) -> Result<Vec<Target>, TargetError> {
    let targets = match spec {
        TargetSpec::HostPorts { host, ports } => {
            let host = host.trim();
            if host.is_empty() {
                return Err(TargetError::config("host must not be empty"));
            }
            ports::parse_port_spec(ports.as_deref())?
                .into_iter()
                .filter_map(|p| Target::new(host, p, mode))
                .collect()
        }
        TargetSpec::File(path) => read_targets_file(path, mode)?,
        TargetSpec::Subnet { subnet, port } => {
            let net = netdetect::parse_subnet(subnet)?;
            let port = *port;
            if port == 0 {
                return Err(TargetError::config("sweep port must be between 1 and 65535"));
            }
            netdetect::expand_hosts(net)
                .into_iter()
                .filter_map(|ip| Target::new(ip.to_string(), port, mode))
                .collect()
        }
    };
    Ok(dedup(targets))
}

/// Read a target file. See [`parse_targets_str`] for the format.
pub fn read_targets_file(path: impl AsRef<Path>, mode: ProbeMode) -> Result<Vec<Target>, TargetError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| TargetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_targets_str(&content, mode)
}

/// Parse target-file content.
///
/// - blank lines and lines starting with `#` are skipped
/// - `host` alone uses port 80
/// - `host:port` splits on the first `:`
pub fn parse_targets_str(s: &str, mode: ProbeMode) -> Result<Vec<Target>, TargetError> {
    let mut out = Vec::new();
    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (host, port) = match line.split_once(':') {
            Some((h, p)) => {
                let p = p.trim();
                let port = p.parse::<u16>().ok().filter(|&v| v != 0).ok_or_else(|| {
                    TargetError::config(format!("line {line_no}: invalid port {p:?}"))
                })?;
                (h.trim(), port)
            }
            None => (line, DEFAULT_TARGET_PORT),
        };
        if host.is_empty() {
            return Err(TargetError::config(format!("line {line_no}: missing host")));
        }
        out.extend(Target::new(host, port, mode));
    }
    Ok(dedup(out))
}

/// Move every target onto `port`, dropping hosts that become duplicates.
pub fn on_port(targets: Vec<Target>, port: u16) -> Vec<Target> {
    dedup(
        targets
            .into_iter()
            .filter_map(|t| Target::new(t.host, port, t.mode))
            .collect(),
    )
}

fn dedup(targets: Vec<Target>) -> Vec<Target> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|t| seen.insert((t.host.clone(), t.port)))
        .collect()
}
