use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ::time::{format_description::well_known, OffsetDateTime};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ScanConfig;
use crate::error::{ScanError, TargetError};
use crate::probe::{self, ProbeStrategy};
use crate::targets::{self, TargetSpec};
use crate::types::{ProbeMode, ProbeOutcome, ScanReport, Target};

/// Upper bound on concurrently running probes, whatever the configuration says.
pub const MAX_WORKERS: usize = 5_000;

/// Run `strategy` over every target with at most `config.worker_limit`
/// probes in flight, and return the sorted report.
///
/// - a `Semaphore` bounds concurrency; each probe holds one permit until its
///   outcome is delivered and the courtesy `delay` has passed
/// - outcomes arrive in completion order over a channel owned by the scheduler
/// - a probe task that dies without reporting gets an `InternalError` outcome
pub async fn run_scan(
    label: &str,
    targets: &[Target],
    strategy: Arc<dyn ProbeStrategy>,
    config: &ScanConfig,
) -> Result<ScanReport, ScanError> {
    run_scan_internal(label, targets, strategy, config, None, None).await
}

/// Variant that accepts a `CancellationToken` to allow external cancellation.
///
/// Cancelling stops dispatch; probes already running finish normally and
/// every undispatched target is reported as an internal error.
pub async fn run_scan_with_cancel(
    label: &str,
    targets: &[Target],
    strategy: Arc<dyn ProbeStrategy>,
    config: &ScanConfig,
    cancel: CancellationToken,
) -> Result<ScanReport, ScanError> {
    run_scan_internal(label, targets, strategy, config, Some(cancel), None).await
}

/// Live counters a caller can poll while a scan is running.
#[derive(Clone, Debug, Default)]
pub struct SharedProgress {
    pub total: Arc<AtomicU64>,
    pub scanned_done: Arc<AtomicU64>,
    pub succeeded_count: Arc<AtomicU64>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.scanned_done.load(Ordering::Relaxed),
            self.succeeded_count.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }
}

pub async fn run_scan_with_shared(
    label: &str,
    targets: &[Target],
    strategy: Arc<dyn ProbeStrategy>,
    config: &ScanConfig,
    cancel: CancellationToken,
    shared: SharedProgress,
) -> Result<ScanReport, ScanError> {
    run_scan_internal(label, targets, strategy, config, Some(cancel), Some(shared)).await
}

/// Enumerate `spec`, build the default strategy for `config.mode` and scan.
///
/// A TCP-fallback sweep moves every target onto the configured liveness
/// port, so each outcome records the port that was checked.
pub async fn scan_spec(spec: &TargetSpec, config: &ScanConfig) -> Result<ScanReport, ScanError> {
    let mut targets = targets::enumerate(spec, config.mode)?;
    if let Some(port) = config.liveness_port() {
        if port == 0 {
            return Err(TargetError::config("liveness port must be between 1 and 65535").into());
        }
        targets = targets::on_port(targets, port);
    }
    run_scan(&spec.label(), &targets, probe::strategy_for(config), config).await
}

async fn run_scan_internal(
    label: &str,
    targets: &[Target],
    strategy: Arc<dyn ProbeStrategy>,
    config: &ScanConfig,
    cancel_opt: Option<CancellationToken>,
    shared_opt: Option<SharedProgress>,
) -> Result<ScanReport, ScanError> {
    let shared = shared_opt.unwrap_or_default();
    shared.total.store(targets.len() as u64, Ordering::Relaxed);

    // Child token: the deadline must not cancel the caller's token.
    let cancel = cancel_opt.unwrap_or_default().child_token();
    let _stop_timer = cancel.clone().drop_guard();
    if let Some(deadline) = config.deadline {
        let timer = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep(deadline) => {
                    info!(deadline_ms = deadline.as_millis() as u64, "scan deadline reached");
                    timer.cancel();
                }
                _ = timer.cancelled() => {}
            }
        });
    }

    let worker_limit = config.worker_limit.clamp(1, MAX_WORKERS);
    let scanned_at = now_rfc3339();
    info!(
        label,
        mode = %config.mode,
        targets = targets.len(),
        worker_limit,
        timeout_ms = config.timeout.as_millis() as u64,
        "scan started"
    );

    let sem = Arc::new(Semaphore::new(worker_limit));
    let (tx, mut rx) = mpsc::unbounded_channel::<(usize, ProbeOutcome)>();
    let mut slots: Vec<Option<ProbeOutcome>> = vec![None; targets.len()];
    let mut set = JoinSet::new();
    let mut dispatched = 0usize;

    for (idx, target) in targets.iter().enumerate() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = sem.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        // Collect whatever finished while we waited for a slot.
        while let Ok((i, outcome)) = rx.try_recv() {
            slots[i] = Some(outcome);
        }

        let strategy = strategy.clone();
        let target = target.clone();
        let tx = tx.clone();
        let shared = shared.clone();
        let timeout = config.timeout;
        let delay = config.delay;

        set.spawn(async move {
            let _permit = permit; // keep permit until the courtesy delay is over

            let outcome = strategy.probe(&target, timeout).await;
            debug!(
                endpoint = %target.endpoint(),
                succeeded = outcome.succeeded,
                error = outcome.error.map(|e| e.as_str()),
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "probe finished"
            );
            shared.scanned_done.fetch_add(1, Ordering::Relaxed);
            if outcome.succeeded {
                shared.succeeded_count.fetch_add(1, Ordering::Relaxed);
            }
            // The receiver lives until every task has been joined.
            let _ = tx.send((idx, outcome));

            if !delay.is_zero() {
                time::sleep(delay).await;
            }
        });
        dispatched += 1;
    }
    drop(tx);

    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            warn!(error = %e, "probe task failed");
        }
    }
    while let Some((i, outcome)) = rx.recv().await {
        slots[i] = Some(outcome);
    }

    let mut outcomes = Vec::with_capacity(targets.len());
    for (idx, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(outcome) => outcomes.push(outcome),
            None => {
                let detail = if idx < dispatched {
                    "probe task ended without an outcome"
                } else {
                    "scan cancelled before probe"
                };
                warn!(endpoint = %targets[idx].endpoint(), detail, "synthesizing internal error");
                outcomes.push(ProbeOutcome::internal(targets[idx].clone(), detail));
            }
        }
    }

    let report = ScanReport {
        subnet_or_host: label.to_string(),
        mode: config.mode,
        timeout_sec: config.timeout.as_secs_f64(),
        read_timeout_sec: (config.mode == ProbeMode::TcpBanner)
            .then(|| config.read_timeout.as_secs_f64()),
        worker_limit,
        delay_sec: config.delay.as_secs_f64(),
        tcp_port: config.liveness_port(),
        targets_requested: targets.len(),
        scanned_at,
        completed_at: String::new(),
        outcomes,
    }
    .finalize(now_rfc3339())?;

    info!(
        label,
        succeeded = report.succeeded_count(),
        total = report.targets_requested,
        "scan completed"
    );
    Ok(report)
}

/// RFC 3339 UTC timestamp.
pub fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_is_utc_rfc3339() {
        let ts = now_rfc3339();
        assert!(ts.ends_with('Z'), "{ts}");
        assert_eq!(ts.as_bytes()[10], b'T', "{ts}");
    }
}
