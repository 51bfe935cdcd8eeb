use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tokio_native_tls::TlsConnector;
use tracing::debug;

use super::connect::connect;
use super::{Failure, ProbeStrategy};
use crate::config::{ProbeOptions, BANNER_BUF_SIZE};
use crate::error::ErrorKind;
use crate::resolve::{HostResolver, SystemResolver};
use crate::types::{ProbeMode, ProbeOutcome, Target};

/// Connect, optionally wrap in TLS and send `HEAD /`, then read a banner.
///
/// A failed TLS handshake is recorded as `TlsError` and the probe carries on
/// over a fresh plaintext connection; the handshake and that reconnect share
/// one `timeout` budget. Certificates are never verified.
pub struct BannerProbe {
    resolver: Arc<dyn HostResolver>,
    options: ProbeOptions,
    read_timeout: Duration,
    tls: Result<TlsConnector, String>,
}

impl BannerProbe {
    pub fn new(options: ProbeOptions, read_timeout: Duration) -> Self {
        Self::with_resolver(options, read_timeout, Arc::new(SystemResolver))
    }

    pub fn with_resolver(
        options: ProbeOptions,
        read_timeout: Duration,
        resolver: Arc<dyn HostResolver>,
    ) -> Self {
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map(TlsConnector::from)
            .map_err(|e| format!("tls setup: {e}"));
        Self {
            resolver,
            options,
            read_timeout,
            tls,
        }
    }

    fn wants_tls(&self, port: u16) -> bool {
        self.options.force_tls || self.options.tls_ports.contains(&port)
    }

    fn wants_http(&self, port: u16) -> bool {
        self.options.send_http_probe && self.options.http_ports.contains(&port)
    }

    async fn handshake(
        &self,
        stream: TcpStream,
        host: &str,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<tokio_native_tls::TlsStream<TcpStream>, Failure> {
        let connector = self
            .tls
            .as_ref()
            .map_err(|e| Failure::new(ErrorKind::TlsError, e.clone()))?;
        match time::timeout_at(deadline, connector.connect(host, stream)).await {
            Ok(Ok(tls)) => Ok(tls),
            Ok(Err(e)) => Err(Failure::new(ErrorKind::TlsError, e.to_string())),
            Err(_) => Err(Failure::new(
                ErrorKind::TlsError,
                format!("handshake not finished within {} ms", timeout.as_millis()),
            )),
        }
    }

    /// Send the optional HTTP probe and read up to one buffer of response.
    ///
    /// The write and the read share a single `read_timeout` deadline.
    async fn exchange<S>(&self, stream: &mut S, target: &Target) -> Result<Option<String>, Failure>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let deadline = Instant::now() + self.read_timeout;
        if self.wants_http(target.port) {
            let request = http_head_request(&target.host);
            let write = async {
                match stream.write_all(request.as_bytes()).await {
                    Ok(()) => stream.flush().await,
                    Err(e) => Err(e),
                }
            };
            match time::timeout_at(deadline, write).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(endpoint = %target.endpoint(), error = %e, "http probe not sent"),
                Err(_) => debug!(endpoint = %target.endpoint(), "http probe write timed out"),
            }
        }

        let mut buf = vec![0u8; BANNER_BUF_SIZE];
        match time::timeout_at(deadline, stream.read(&mut buf)).await {
            Ok(Ok(n)) => Ok(decode_banner(&buf[..n])),
            Ok(Err(e)) => Err(Failure::new(ErrorKind::ReadError, e.to_string())),
            Err(_) => Err(Failure::new(
                ErrorKind::ReadTimeout,
                format!("no data within {} ms", self.read_timeout.as_millis()),
            )),
        }
    }
}

#[async_trait]
impl ProbeStrategy for BannerProbe {
    fn mode(&self) -> ProbeMode {
        ProbeMode::TcpBanner
    }

    async fn probe(&self, target: &Target, timeout: Duration) -> ProbeOutcome {
        let start = Instant::now();
        let resolver = self.resolver.as_ref();
        let stream = match connect(resolver, &target.host, target.port, timeout).await {
            Ok(s) => s,
            Err(f) => return f.into_outcome(target.clone(), start.elapsed()),
        };

        let mut tls_failure = None;
        let result = if self.wants_tls(target.port) {
            let tls_deadline = Instant::now() + timeout;
            match self.handshake(stream, &target.host, tls_deadline, timeout).await {
                Ok(mut tls) => self.exchange(&mut tls, target).await,
                Err(f) => {
                    debug!(endpoint = %target.endpoint(), error = %f.detail, "tls failed, falling back to plaintext");
                    tls_failure = Some(f);
                    let remaining = tls_deadline.saturating_duration_since(Instant::now());
                    match connect(resolver, &target.host, target.port, remaining).await {
                        Ok(mut plain) => self.exchange(&mut plain, target).await,
                        Err(f) => Err(f),
                    }
                }
            }
        } else {
            let mut stream = stream;
            self.exchange(&mut stream, target).await
        };

        let elapsed = start.elapsed();
        match result {
            Ok(payload) => {
                let mut outcome = ProbeOutcome::success(target.clone(), payload, elapsed);
                if let Some(f) = tls_failure {
                    outcome.error = Some(f.kind);
                    outcome.detail = Some(f.detail);
                }
                outcome
            }
            Err(f) => f.into_outcome(target.clone(), elapsed),
        }
    }
}

fn http_head_request(host: &str) -> String {
    let host = match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => format!("[{v6}]"),
        _ => host.to_string(),
    };
    format!("HEAD / HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n")
}

/// Lossy UTF-8 decode, trimmed; nothing left means no banner.
fn decode_banner(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
