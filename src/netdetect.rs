use anyhow::Result;
use if_addrs::{get_if_addrs, IfAddr};
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::ScanError;

/// Narrowest IPv4 prefix accepted for a scan (at most 65,536 addresses).
pub const IPV4_MIN_PREFIX: u8 = 16;
/// Same address budget for IPv6.
pub const IPV6_MIN_PREFIX: u8 = 112;

/// Parse and validate a scan target.
///
/// - Host bits are allowed: `10.0.0.5/24` is the `10.0.0.0/24` block.
/// - A bare address is a single-host block (`/32` or `/128`).
/// - Prefixes wider than the per-family floor are rejected.
pub fn parse_cidr(input: &str) -> Result<IpNet, ScanError> {
    let text = input.trim();
    if text.is_empty() {
        return Err(ScanError::MissingCidr);
    }

    let net = if text.contains('/') {
        text.parse::<IpNet>().map_err(|e| ScanError::InvalidCidr {
            input: text.to_string(),
            reason: e.to_string(),
        })?
    } else {
        let ip = text.parse::<IpAddr>().map_err(|e| ScanError::InvalidCidr {
            input: text.to_string(),
            reason: e.to_string(),
        })?;
        IpNet::from(ip)
    };

    let min = match net {
        IpNet::V4(_) => IPV4_MIN_PREFIX,
        IpNet::V6(_) => IPV6_MIN_PREFIX,
    };
    if net.prefix_len() < min {
        return Err(ScanError::PrefixTooWide {
            prefix: net.prefix_len(),
            min,
        });
    }
    Ok(net.trunc())
}

/// Expand a block into its usable host addresses, ascending.
///
/// IPv4 drops the network and broadcast addresses, except for `/31`
/// (point-to-point, both addresses) and `/32`. IPv6 drops the
/// subnet-router anycast address, except for `/127` and `/128`.
pub fn usable_hosts(net: IpNet) -> Vec<IpAddr> {
    match net {
        IpNet::V4(n4) => ipv4_hosts(n4).into_iter().map(IpAddr::V4).collect(),
        IpNet::V6(n6) => ipv6_hosts(n6).into_iter().map(IpAddr::V6).collect(),
    }
}

fn ipv4_hosts(net: Ipv4Net) -> Vec<Ipv4Addr> {
    let start = u32::from(net.network());
    let end = u32::from(net.broadcast());
    match net.prefix_len() {
        32 | 31 => (start..=end).map(Ipv4Addr::from).collect(),
        _ => (start + 1..end).map(Ipv4Addr::from).collect(),
    }
}

fn ipv6_hosts(net: Ipv6Net) -> Vec<Ipv6Addr> {
    let start = u128::from(net.network());
    let end = u128::from(net.broadcast());
    match net.prefix_len() {
        128 | 127 => (start..=end).map(Ipv6Addr::from).collect(),
        _ => (start + 1..=end).map(Ipv6Addr::from).collect(),
    }
}

/// Detect local non-loopback IPv4 addresses and convert each to a default /24 CIDR network.
///
/// For example, an interface IP `192.168.1.42` becomes `192.168.1.0/24`.
/// Duplicates are removed.
pub fn detect_local_cidrs() -> Result<Vec<IpNet>> {
    let mut set = HashSet::<Ipv4Net>::new();
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            let ip = v4.ip;
            if ip.is_loopback() || ip.is_link_local() {
                continue;
            }
            set.insert(ipv4_to_default_cidr(ip));
        }
    }
    let mut cidrs: Vec<Ipv4Net> = set.into_iter().collect();
    cidrs.sort_by_key(|n| (u32::from(n.network()), n.prefix_len()));
    Ok(cidrs.into_iter().map(IpNet::V4).collect())
}

/// Helper: convert an IPv4 address into its default /24 network.
pub fn ipv4_to_default_cidr(ip: Ipv4Addr) -> Ipv4Net {
    Ipv4Net::new(ip, 24)
        .map(|n| n.trunc())
        .unwrap_or_else(|_| Ipv4Net::from(ip))
}
