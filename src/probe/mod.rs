//! Probe strategies: one network operation against one target.
//!
//! A strategy never returns an error and never panics on network failure;
//! every outcome, including timeouts, comes back as a [`ProbeOutcome`].
pub mod banner;
pub mod connect;
pub mod liveness;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{LivenessMethod, ScanConfig};
use crate::error::ErrorKind;
use crate::types::{ProbeMode, ProbeOutcome, Target};

pub use banner::BannerProbe;
pub use connect::ConnectProbe;
pub use liveness::{HostLivenessChecker, LivenessProbe, SystemPing, TcpLiveness};

#[async_trait]
pub trait ProbeStrategy: Send + Sync {
    fn mode(&self) -> ProbeMode;

    /// Probe `target`; `timeout` bounds the connect (or ping) phase.
    async fn probe(&self, target: &Target, timeout: Duration) -> ProbeOutcome;
}

/// Build the built-in strategy for `config.mode`.
pub fn strategy_for(config: &ScanConfig) -> Arc<dyn ProbeStrategy> {
    match config.mode {
        ProbeMode::TcpConnect => Arc::new(ConnectProbe::new()),
        ProbeMode::TcpBanner => Arc::new(BannerProbe::new(
            config.options.clone(),
            config.read_timeout,
        )),
        ProbeMode::IcmpPing => match config.options.liveness {
            LivenessMethod::SystemPing => {
                Arc::new(LivenessProbe::new(Arc::new(SystemPing::default())))
            }
            // The port travels on each target; see `scanner::scan_spec`.
            LivenessMethod::Tcp { .. } => Arc::new(LivenessProbe::new(Arc::new(TcpLiveness::new()))),
        },
    }
}

/// Classified failure of one probe phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: ErrorKind,
    pub detail: String,
}

impl Failure {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn into_outcome(self, target: Target, elapsed: Duration) -> ProbeOutcome {
        ProbeOutcome::failure(target, self.kind, self.detail, elapsed)
    }
}
