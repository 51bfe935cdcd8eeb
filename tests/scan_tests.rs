use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lan_probe_rs::config::{LivenessMethod, ScanConfig};
use lan_probe_rs::error::ErrorKind;
use lan_probe_rs::probe::{
    ConnectProbe, Failure, HostLivenessChecker, LivenessProbe, ProbeStrategy,
};
use lan_probe_rs::scanner::{run_scan, run_scan_with_cancel, run_scan_with_shared, scan_spec, SharedProgress};
use lan_probe_rs::targets::{enumerate, TargetSpec};
use lan_probe_rs::types::{ProbeMode, ProbeOutcome, Target};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Succeeds on `open` ports, sleeps a port-dependent time and records the
/// highest number of simultaneously running probes.
struct FakeStrategy {
    open: HashSet<u16>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    panic_on: Option<u16>,
    sleep: Duration,
}

impl FakeStrategy {
    fn new(open: &[u16]) -> Self {
        Self {
            open: open.iter().copied().collect(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            panic_on: None,
            sleep: Duration::from_millis(5),
        }
    }
}

#[async_trait]
impl ProbeStrategy for FakeStrategy {
    fn mode(&self) -> ProbeMode {
        ProbeMode::TcpConnect
    }

    async fn probe(&self, target: &Target, _timeout: Duration) -> ProbeOutcome {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if self.panic_on == Some(target.port) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            panic!("probe blew up on port {}", target.port);
        }
        let start = Instant::now();
        tokio::time::sleep(self.sleep + Duration::from_millis(u64::from(target.port % 7))).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.open.contains(&target.port) {
            ProbeOutcome::success(target.clone(), None, start.elapsed())
        } else {
            ProbeOutcome::failure(target.clone(), ErrorKind::ConnectError, "refused", start.elapsed())
        }
    }
}

fn port_targets(ports: &[u16]) -> Vec<Target> {
    ports
        .iter()
        .map(|&p| Target::new("10.0.0.1", p, ProbeMode::TcpConnect).unwrap())
        .collect()
}

fn ports_of(outcomes: &[ProbeOutcome]) -> Vec<u16> {
    outcomes.iter().map(|o| o.target.port).collect()
}

#[tokio::test]
async fn every_target_gets_one_outcome_within_worker_limit() {
    let ports: Vec<u16> = (1..=200).rev().collect();
    let targets = port_targets(&ports);
    let strategy = Arc::new(FakeStrategy::new(&[22, 80]));
    let mut config = ScanConfig::default();
    config.worker_limit = 8;

    let report = run_scan("10.0.0.1", &targets, strategy.clone(), &config)
        .await
        .unwrap();

    assert_eq!(report.targets_requested, 200);
    assert_eq!(report.outcomes.len(), 200);
    assert_eq!(ports_of(&report.outcomes), (1..=200).collect::<Vec<u16>>());
    assert_eq!(report.succeeded_count(), 2);
    assert!(strategy.max_in_flight.load(Ordering::SeqCst) <= 8);
    assert!(strategy.max_in_flight.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn outcomes_sorted_regardless_of_submission_order() {
    let targets = port_targets(&[443, 22, 80]);
    let strategy = Arc::new(FakeStrategy::new(&[]));
    let report = run_scan("10.0.0.1", &targets, strategy, &ScanConfig::default())
        .await
        .unwrap();
    assert_eq!(ports_of(&report.outcomes), vec![22, 80, 443]);
}

#[tokio::test]
async fn panicking_probe_becomes_internal_error() {
    let targets = port_targets(&[11, 12, 13, 14]);
    let mut strategy = FakeStrategy::new(&[11, 12, 14]);
    strategy.panic_on = Some(13);

    let report = run_scan("10.0.0.1", &targets, Arc::new(strategy), &ScanConfig::default())
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 4);
    let failed = &report.outcomes[2];
    assert_eq!(failed.target.port, 13);
    assert!(!failed.succeeded);
    assert_eq!(failed.error, Some(ErrorKind::InternalError));
    assert_eq!(report.succeeded_count(), 3);
}

#[tokio::test]
async fn cancellation_still_reports_every_target() {
    let targets = port_targets(&(1..=10).collect::<Vec<u16>>());
    let mut strategy = FakeStrategy::new(&(1..=10).collect::<Vec<u16>>());
    strategy.sleep = Duration::from_millis(300);
    let mut config = ScanConfig::default();
    config.worker_limit = 1;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let report = run_scan_with_cancel("10.0.0.1", &targets, Arc::new(strategy), &config, cancel)
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 10);
    assert!(report.outcomes[0].succeeded);
    let skipped: Vec<_> = report.outcomes[1..].iter().collect();
    assert!(skipped
        .iter()
        .all(|o| o.error == Some(ErrorKind::InternalError) && !o.succeeded));
}

#[tokio::test]
async fn deadline_stops_dispatch() {
    let targets = port_targets(&(1..=6).collect::<Vec<u16>>());
    let mut strategy = FakeStrategy::new(&[]);
    strategy.sleep = Duration::from_millis(200);
    let mut config = ScanConfig::default();
    config.worker_limit = 2;
    config.deadline = Some(Duration::from_millis(100));

    let report = run_scan("10.0.0.1", &targets, Arc::new(strategy), &config)
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 6);
    let internal = report
        .outcomes
        .iter()
        .filter(|o| o.error == Some(ErrorKind::InternalError))
        .count();
    assert_eq!(internal, 4);
}

#[tokio::test]
async fn courtesy_delay_is_not_part_of_elapsed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let targets = vec![
        Target::new("127.0.0.1", port, ProbeMode::TcpConnect).unwrap(),
        Target::new("localhost", port, ProbeMode::TcpConnect).unwrap(),
    ];
    let mut config = ScanConfig::default();
    config.worker_limit = 1;
    config.delay = Duration::from_millis(300);

    let started = Instant::now();
    let report = run_scan("local", &targets, Arc::new(ConnectProbe::new()), &config)
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(600));
    for o in &report.outcomes {
        assert!(o.elapsed < Duration::from_millis(300), "{o:?}");
    }
    assert_eq!(report.delay_sec, 0.3);
}

#[tokio::test]
async fn shared_progress_counts_completions() {
    let targets = port_targets(&[1, 2, 3, 4, 5]);
    let shared = SharedProgress::new();
    let report = run_scan_with_shared(
        "10.0.0.1",
        &targets,
        Arc::new(FakeStrategy::new(&[2, 4])),
        &ScanConfig::default(),
        CancellationToken::new(),
        shared.clone(),
    )
    .await
    .unwrap();
    assert_eq!(shared.snapshot(), (5, 2, 5));
    assert_eq!(report.succeeded_count(), 2);
}

#[tokio::test]
async fn port_scan_end_to_end_against_localhost() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open = listener.local_addr().unwrap().port();
    let mut held = Vec::new();
    for _ in 0..3 {
        held.push(TcpListener::bind("127.0.0.1:0").await.unwrap());
    }
    let closed: Vec<u16> = held.iter().map(|l| l.local_addr().unwrap().port()).collect();
    drop(held);
    let spec = TargetSpec::HostPorts {
        host: "127.0.0.1".into(),
        ports: Some(format!("{},{},{},{}", open, closed[0], closed[1], closed[2])),
    };
    let mut config = ScanConfig::default();
    config.timeout = Duration::from_secs(1);

    let report = scan_spec(&spec, &config).await.unwrap();

    assert_eq!(report.outcomes.len(), 4);
    let mut expected: Vec<u16> = closed.clone();
    expected.push(open);
    expected.sort_unstable();
    assert_eq!(ports_of(&report.outcomes), expected);
    for o in &report.outcomes {
        if o.target.port == open {
            assert!(o.succeeded);
        } else {
            assert!(!o.succeeded);
            assert_eq!(o.error, Some(ErrorKind::ConnectError));
        }
    }
    drop(listener);
}

/// Pretends exactly one host of the sweep answers.
struct OneHostUp;

#[async_trait]
impl HostLivenessChecker for OneHostUp {
    async fn check(&self, target: &Target, _timeout: Duration) -> Result<(), Failure> {
        if target.host == "10.0.0.7" {
            Ok(())
        } else {
            Err(Failure::new(ErrorKind::ConnectTimeout, "no answer"))
        }
    }
}

#[tokio::test]
async fn subnet_sweep_reports_all_254_hosts_in_address_order() {
    let spec = TargetSpec::Subnet {
        subnet: "10.0.0".into(),
        port: 80,
    };
    let mut config = ScanConfig::for_mode(ProbeMode::IcmpPing);
    config.options.liveness = LivenessMethod::Tcp { port: 80 };
    config.delay = Duration::ZERO;

    let mut targets = enumerate(&spec, config.mode).unwrap();
    targets.reverse();
    let strategy = Arc::new(LivenessProbe::new(Arc::new(OneHostUp)));
    let report = run_scan(&spec.label(), &targets, strategy, &config)
        .await
        .unwrap();

    assert_eq!(report.subnet_or_host, "10.0.0.0/24");
    assert_eq!(report.tcp_port, Some(80));
    assert_eq!(report.outcomes.len(), 254);
    let hosts: Vec<String> = report.outcomes.iter().map(|o| o.target.host.clone()).collect();
    let expected: Vec<String> = (1..=254).map(|i| format!("10.0.0.{i}")).collect();
    assert_eq!(hosts, expected);
    assert_eq!(report.succeeded_count(), 1);
    assert!(report.outcomes[6].succeeded);
}

#[tokio::test]
async fn tcp_fallback_sweep_checks_and_records_the_liveness_port() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    // The subnet spec keeps its default port; the configured one wins.
    let spec = TargetSpec::subnet("127.0.0.0/30");
    let mut config = ScanConfig::for_mode(ProbeMode::IcmpPing);
    config.options.liveness = LivenessMethod::Tcp { port };
    config.timeout = Duration::from_millis(500);
    config.delay = Duration::ZERO;

    let report = scan_spec(&spec, &config).await.unwrap();

    assert_eq!(report.tcp_port, Some(port));
    assert_eq!(report.outcomes.len(), 2);
    assert!(report.outcomes.iter().all(|o| o.target.port == port));
    assert_eq!(report.outcomes[0].target.host, "127.0.0.1");
    assert!(report.outcomes[0].succeeded, "{:?}", report.outcomes[0]);
    drop(listener);
}

#[tokio::test]
async fn report_serializes_for_collaborators() {
    let targets = port_targets(&[22]);
    let report = run_scan("10.0.0.1", &targets, Arc::new(FakeStrategy::new(&[22])), &ScanConfig::default())
        .await
        .unwrap();
    let v = serde_json::to_value(&report).unwrap();
    for key in [
        "subnet_or_host",
        "mode",
        "timeout_sec",
        "worker_limit",
        "scanned_at",
        "completed_at",
        "outcomes",
    ] {
        assert!(v.get(key).is_some(), "missing {key}");
    }
    assert_eq!(v["mode"], "tcp_connect");
    assert_eq!(v["outcomes"][0]["succeeded"], true);
    assert!(v["outcomes"][0]["elapsed_ms"].is_u64());
}

#[tokio::test]
async fn empty_target_list_gives_empty_report() {
    let report = run_scan("nothing", &[], Arc::new(FakeStrategy::new(&[])), &ScanConfig::default())
        .await
        .unwrap();
    assert_eq!(report.targets_requested, 0);
    assert!(report.outcomes.is_empty());
}
