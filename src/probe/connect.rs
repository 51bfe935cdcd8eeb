use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::debug;

use super::{Failure, ProbeStrategy};
use crate::error::ErrorKind;
use crate::resolve::{HostResolver, SystemResolver};
use crate::types::{ProbeMode, ProbeOutcome, Target};

/// Plain TCP connect check; no data is exchanged.
#[derive(Clone)]
pub struct ConnectProbe {
    resolver: Arc<dyn HostResolver>,
}

impl ConnectProbe {
    pub fn new() -> Self {
        Self::with_resolver(Arc::new(SystemResolver))
    }

    pub fn with_resolver(resolver: Arc<dyn HostResolver>) -> Self {
        Self { resolver }
    }
}

impl Default for ConnectProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProbeStrategy for ConnectProbe {
    fn mode(&self) -> ProbeMode {
        ProbeMode::TcpConnect
    }

    async fn probe(&self, target: &Target, timeout: Duration) -> ProbeOutcome {
        let start = Instant::now();
        match connect(self.resolver.as_ref(), &target.host, target.port, timeout).await {
            Ok(_stream) => ProbeOutcome::success(target.clone(), None, start.elapsed()),
            Err(f) => f.into_outcome(target.clone(), start.elapsed()),
        }
    }
}

/// Resolve and connect to `host:port`, trying each resolved address in turn.
///
/// Resolution and every connect attempt share the single `timeout` budget.
pub(crate) async fn connect(
    resolver: &dyn HostResolver,
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<TcpStream, Failure> {
    let attempt = async {
        let addrs = match resolver.resolve(host, port).await {
            Ok(addrs) => addrs,
            Err(e) => {
                return Err(Failure::new(
                    ErrorKind::ConnectError,
                    format!("resolve {host}: {e}"),
                ))
            }
        };
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!(%addr, error = %e, "connect failed");
                    last_err = Some(e);
                }
            }
        }
        Err(match last_err {
            Some(e) => classify_connect_error(&e),
            None => Failure::new(
                ErrorKind::ConnectError,
                format!("{host} resolved to no addresses"),
            ),
        })
    };

    match time::timeout(timeout, attempt).await {
        Ok(res) => res,
        Err(_elapsed) => Err(Failure::new(
            ErrorKind::ConnectTimeout,
            format!("no connection within {} ms", timeout.as_millis()),
        )),
    }
}

fn classify_connect_error(e: &io::Error) -> Failure {
    let kind = match e.kind() {
        io::ErrorKind::TimedOut => ErrorKind::ConnectTimeout,
        _ => ErrorKind::ConnectError,
    };
    Failure::new(kind, e.to_string())
}
