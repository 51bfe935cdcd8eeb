use std::collections::HashSet;
use std::net::Ipv4Addr;

use if_addrs::{get_if_addrs, IfAddr};
use ipnet::Ipv4Net;

use crate::error::TargetError;

/// Parse a sweep subnet.
///
/// Accepts a three-octet prefix (`192.168.1`, meaning `192.168.1.0/24`) or
/// IPv4 CIDR notation (`10.0.0.0/28`). Host bits in CIDR input are cleared.
pub fn parse_subnet(s: &str) -> Result<Ipv4Net, TargetError> {
    let s = s.trim();
    if s.contains('/') {
        let net: Ipv4Net = s
            .parse()
            .map_err(|e| TargetError::config(format!("invalid CIDR {s:?}: {e}")))?;
        return Ok(net.trunc());
    }

    let octets: Vec<&str> = s.split('.').collect();
    if octets.len() != 3 {
        return Err(TargetError::config(format!(
            "subnet prefix {s:?} must have exactly three octets"
        )));
    }
    let mut o = [0u8; 3];
    for (slot, part) in o.iter_mut().zip(&octets) {
        *slot = part
            .trim()
            .parse::<u8>()
            .map_err(|e| TargetError::config(format!("invalid octet {part:?} in {s:?}: {e}")))?;
    }
    Ok(ipv4_to_default_cidr(Ipv4Addr::new(o[0], o[1], o[2], 0)))
}

/// Host addresses of a network in ascending order, excluding the network and
/// broadcast addresses. `/31` and `/32` have no host addresses here.
pub fn expand_hosts(net: Ipv4Net) -> Vec<Ipv4Addr> {
    if net.prefix_len() >= 31 {
        return Vec::new();
    }
    let first = u32::from(net.network()) + 1;
    let broadcast = u32::from(net.broadcast());
    (first..broadcast).map(Ipv4Addr::from).collect()
}

/// Convert an IPv4 address into its default /24 network.
pub fn ipv4_to_default_cidr(ip: Ipv4Addr) -> Ipv4Net {
    let o = ip.octets();
    let net = Ipv4Addr::new(o[0], o[1], o[2], 0);
    Ipv4Net::new(net, 24).expect("/24 is always valid")
}

/// Detect local non-loopback IPv4 addresses and convert each to a default /24 network.
///
/// For example, an interface IP `192.168.1.42` becomes `192.168.1.0/24`.
/// Duplicates are removed and the list is sorted by network address.
pub fn detect_local_cidrs() -> std::io::Result<Vec<Ipv4Net>> {
    let mut set = HashSet::<Ipv4Net>::new();
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            set.insert(ipv4_to_default_cidr(v4.ip));
        }
    }
    let mut cidrs: Vec<Ipv4Net> = set.into_iter().collect();
    cidrs.sort_by_key(|n| (u32::from(n.network()), n.prefix_len()));
    Ok(cidrs)
}
