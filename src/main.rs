use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lan_probe_rs::config::{LivenessMethod, ScanConfig};
use lan_probe_rs::types::{ProbeMode, ScanReport, Target};
use lan_probe_rs::{netdetect, ports, probe, scanner, targets};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// TCP connect check
    Connect,
    /// Connect, optional TLS and HTTP HEAD, read a banner
    Banner,
    /// Host liveness sweep
    Ping,
}

impl From<Mode> for ProbeMode {
    fn from(m: Mode) -> Self {
        match m {
            Mode::Connect => ProbeMode::TcpConnect,
            Mode::Banner => ProbeMode::TcpBanner,
            Mode::Ping => ProbeMode::IcmpPing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Liveness {
    /// System ping utility
    Icmp,
    /// TCP connect to --tcp-port
    Tcp,
}

/// lan-probe-rs — bounded-concurrency TCP connect scans, banner grabs and ping sweeps.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "lan-probe-rs",
    version,
    about = "Bounded-concurrency TCP connect scans, banner grabs and ping sweeps.",
    long_about = None
)]
struct Cli {
    /// Target host (IP or hostname), used with --ports.
    #[arg(long, short = 't')]
    host: Option<String>,

    /// Ports: `1-100`, `22,80,443`, or `@path` to a ports file. Defaults to 1-100.
    #[arg(long, short = 'p')]
    ports: Option<String>,

    /// File with one `host[:port]` per line (overrides --host/--ports).
    #[arg(long)]
    targets: Option<PathBuf>,

    /// Sweep subnet: `192.168.1`, an IPv4 CIDR, or `auto` for local /24 networks.
    #[arg(long)]
    subnet: Option<String>,

    /// Probe mode. Defaults to `ping` with --subnet, `connect` otherwise.
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Connect / ping timeout in seconds.
    #[arg(long)]
    timeout: Option<f64>,

    /// Banner read timeout in seconds (defaults to --timeout).
    #[arg(long = "read-timeout")]
    read_timeout: Option<f64>,

    /// Max concurrent probes.
    #[arg(long, short = 'w')]
    workers: Option<usize>,

    /// Pause after each probe before its worker is reused, in seconds.
    #[arg(long)]
    delay: Option<f64>,

    /// Stop dispatching new probes after this many seconds.
    #[arg(long)]
    deadline: Option<f64>,

    /// Do not send `HEAD /` to HTTP ports in banner mode.
    #[arg(long = "no-http-probe", default_value_t = false)]
    no_http_probe: bool,

    /// Force TLS on every banner probe.
    #[arg(long, default_value_t = false)]
    tls: bool,

    /// How ping sweeps decide a host is up.
    #[arg(long, value_enum, default_value_t = Liveness::Icmp)]
    liveness: Liveness,

    /// Port for `--liveness tcp`.
    #[arg(long = "tcp-port", default_value_t = 80, value_parser = clap::value_parser!(u16).range(1..))]
    tcp_port: u16,

    /// Write the report as pretty JSON to this path.
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG).
    #[arg(long, short = 'v', default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = build_config(&cli)?;
    let (label, mut targets) = build_targets(&cli, config.mode)?;
    if let Some(port) = config.liveness_port() {
        targets = targets::on_port(targets, port);
    }
    if targets.is_empty() {
        bail!("no targets to probe");
    }

    println!(
        "Probing {} — {} targets (mode={}, timeout={}s, workers={})",
        label,
        targets.len(),
        config.mode,
        config.timeout.as_secs_f64(),
        config.worker_limit
    );

    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing in-flight probes");
            cancel_ctrlc.cancel();
        }
    });

    let strategy = probe::strategy_for(&config);
    let report = scanner::run_scan_with_cancel(&label, &targets, strategy, &config, cancel).await?;

    print_results_table(&report);
    if let Some(path) = cli.output.as_deref() {
        write_report_json(path, &report)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
        println!("Results written to {}", path.display());
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn secs(name: &str, v: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(v).with_context(|| format!("invalid --{name} value {v}"))
}

fn build_config(cli: &Cli) -> Result<ScanConfig> {
    let mode = cli
        .mode
        .unwrap_or(if cli.subnet.is_some() { Mode::Ping } else { Mode::Connect });
    let mut config = ScanConfig::for_mode(mode.into());

    if let Some(t) = cli.timeout {
        config.timeout = secs("timeout", t)?;
        config.read_timeout = config.timeout;
    }
    if let Some(t) = cli.read_timeout {
        config.read_timeout = secs("read-timeout", t)?;
    }
    if let Some(w) = cli.workers {
        config.worker_limit = w;
    }
    if let Some(d) = cli.delay {
        config.delay = secs("delay", d)?;
    }
    if let Some(d) = cli.deadline {
        config.deadline = Some(secs("deadline", d)?);
    }
    config.options.send_http_probe = !cli.no_http_probe;
    config.options.force_tls = cli.tls;
    config.options.liveness = match cli.liveness {
        Liveness::Icmp => LivenessMethod::SystemPing,
        Liveness::Tcp => LivenessMethod::Tcp { port: cli.tcp_port },
    };
    Ok(config)
}

fn build_targets(cli: &Cli, mode: ProbeMode) -> Result<(String, Vec<Target>)> {
    if let Some(path) = cli.targets.as_ref() {
        let spec = targets::TargetSpec::File(path.clone());
        return Ok((spec.label(), targets::enumerate(&spec, mode)?));
    }

    if let Some(subnet) = cli.subnet.as_deref() {
        let nets: Vec<String> = if subnet.trim() == "auto" {
            let cidrs = netdetect::detect_local_cidrs()
                .context("failed to detect local networks")?;
            if cidrs.is_empty() {
                bail!("no local IPv4 networks detected");
            }
            for cidr in &cidrs {
                info!(%cidr, hosts = netdetect::expand_hosts(*cidr).len(), "detected local network");
            }
            cidrs.iter().map(|c| c.to_string()).collect()
        } else {
            vec![subnet.to_string()]
        };

        let mut labels = Vec::new();
        let mut all = Vec::new();
        for net in nets {
            let spec = targets::TargetSpec::Subnet {
                subnet: net,
                port: cli.tcp_port,
            };
            labels.push(spec.label());
            all.extend(targets::enumerate(&spec, mode)?);
        }
        return Ok((labels.join(","), all));
    }

    let Some(host) = cli.host.clone() else {
        bail!("one of --host, --targets or --subnet is required");
    };

    match cli.ports.as_deref().and_then(|p| p.strip_prefix('@')) {
        Some(path) => {
            let list = ports::load_ports_from_path(path)?;
            let host = host.trim().to_string();
            let targets = list
                .into_iter()
                .filter_map(|p| Target::new(host.clone(), p, mode))
                .collect();
            Ok((host, targets))
        }
        None => {
            let spec = targets::TargetSpec::HostPorts {
                host,
                ports: cli.ports.clone(),
            };
            Ok((spec.label(), targets::enumerate(&spec, mode)?))
        }
    }
}

fn print_results_table(report: &ScanReport) {
    let mut target_w = "target".len();
    let mut info_w = "info".len();
    let rows: Vec<(String, &str, u128, String)> = report
        .outcomes
        .iter()
        .map(|o| {
            let status = if o.succeeded { "up" } else { "down" };
            let mut info = match (&o.payload, &o.error) {
                (Some(p), _) => p.replace('\n', "\\n").replace('\r', "\\r"),
                (None, Some(e)) => e.to_string(),
                (None, None) => String::new(),
            };
            if info.len() > 60 {
                let mut cut = 60;
                while !info.is_char_boundary(cut) {
                    cut -= 1;
                }
                info.truncate(cut);
            }
            (o.target.endpoint(), status, o.elapsed.as_millis(), info)
        })
        .collect();
    for (t, _, _, i) in &rows {
        target_w = target_w.max(t.len());
        info_w = info_w.max(i.len());
    }
    let status_w = "status".len();
    let ms_w = "elapsed_ms".len();

    println!(
        "\nSucceeded: {} of {} (started {}, completed {})",
        report.succeeded_count(),
        report.targets_requested,
        report.scanned_at,
        report.completed_at
    );
    println!(
        "{:<target_w$}  {:<status_w$}  {:>ms_w$}  {:<info_w$}",
        "target", "status", "elapsed_ms", "info",
    );
    println!(
        "{:-<target_w$}  {:-<status_w$}  {:-<ms_w$}  {:-<info_w$}",
        "", "", "", "",
    );
    for (t, s, ms, i) in &rows {
        println!("{:<target_w$}  {:<status_w$}  {:>ms_w$}  {:<info_w$}", t, s, ms, i);
    }
}

fn write_report_json(path: &Path, report: &ScanReport) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}
