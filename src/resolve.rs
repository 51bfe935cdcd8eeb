use std::io;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use tokio::net::lookup_host;

/// Turns a target host into socket addresses before a probe connects.
///
/// The default [`SystemResolver`] uses the platform resolver; richer
/// implementations (caching, custom DNS servers, static maps) plug in here
/// without touching the probes.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

/// IP literals pass through untouched; names go to `getaddrinfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![SocketAddr::new(ip, port)]);
        }
        Ok(lookup_host((host, port)).await?.collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn literals_skip_lookup() {
        let addrs = SystemResolver.resolve("10.1.2.3", 22).await.unwrap();
        assert_eq!(addrs, vec!["10.1.2.3:22".parse::<SocketAddr>().unwrap()]);
        let v6 = SystemResolver.resolve("::1", 443).await.unwrap();
        assert_eq!(v6, vec!["[::1]:443".parse::<SocketAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn localhost_resolves() {
        let addrs = SystemResolver.resolve("localhost", 80).await.unwrap();
        assert!(addrs.iter().all(|a| a.port() == 80 && a.ip().is_loopback()));
    }
}
