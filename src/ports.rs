use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time;

/// One well-known port and the service it implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortEntry {
    pub port: u16,
    pub label: &'static str,
}

const fn entry(port: u16, label: &'static str) -> PortEntry {
    PortEntry { port, label }
}

/// Ports probed on every live host, ascending.
pub const CATALOGUE: &[PortEntry] = &[
    entry(22, "SSH"),
    entry(80, "HTTP"),
    entry(443, "HTTPS"),
    entry(3306, "MySQL"),
    entry(5432, "PostgreSQL"),
    entry(5900, "VNC"),
    entry(6443, "Kubernetes"),
    entry(8006, "Proxmox"),
    entry(8080, "HTTP-alt"),
    entry(8443, "HTTPS-alt"),
    entry(9090, "Cockpit"),
    entry(9100, "Node Exporter"),
];

pub const SSH_PORT: u16 = 22;
pub const PROXMOX_PORT: u16 = 8006;
pub const COCKPIT_PORT: u16 = 9090;
pub const KUBERNETES_PORT: u16 = 6443;
pub const VNC_PORT: u16 = 5900;

/// Ports that speak HTTP(S) well enough to answer a `GET /`.
pub const HTTP_PORTS: &[u16] = &[80, 443, 8006, 8080, 8443, 9090];

/// Order in which open web ports are asked for a page title.
pub const TITLE_PORTS: &[u16] = &[8006, 80, 443, 8080, 8443, 9090];

/// Web ports reached over TLS.
pub const HTTPS_PORTS: &[u16] = &[443, 8443];

/// Catalogue port numbers, in scan order.
pub fn catalogue_ports() -> Vec<u16> {
    CATALOGUE.iter().map(|e| e.port).collect()
}

/// Service label for a catalogued port.
pub fn service_label(port: u16) -> Option<&'static str> {
    CATALOGUE
        .binary_search_by_key(&port, |e| e.port)
        .ok()
        .map(|i| CATALOGUE[i].label)
}

pub fn is_http_port(port: u16) -> bool {
    HTTP_PORTS.contains(&port)
}

pub fn is_https_port(port: u16) -> bool {
    HTTPS_PORTS.contains(&port)
}

/// Try a TCP connect to every port and return the ones that accepted, ascending.
///
/// - Each attempt is bounded by `timeout` and runs independently of the others.
/// - Refused, unreachable and timed out connects are all treated as closed.
/// - Duplicate ports are probed once.
/// - All connects are in flight at once, so a batch holds up to
///   `ports.len()` sockets per live host. A connect that fails for lack of
///   file descriptors reads as closed; keep batch concurrency well under
///   the process fd limit divided by the catalogue size.
pub async fn scan_ports(ip: IpAddr, ports: &[u16], timeout: Duration) -> Vec<u16> {
    let unique: BTreeSet<u16> = ports.iter().copied().collect();
    let mut set = JoinSet::new();
    for port in unique {
        set.spawn(async move {
            let open = connect(SocketAddr::new(ip, port), timeout).await;
            (port, open)
        });
    }

    let mut open = Vec::new();
    while let Some(res) = set.join_next().await {
        match res {
            Ok((port, true)) => open.push(port),
            Ok((_, false)) => {}
            Err(e) => tracing::debug!(ip = %ip, error = %e, "port probe task failed"),
        }
    }
    open.sort_unstable();
    open
}

/// Bounded TCP connect; true when the peer accepted.
pub async fn connect(addr: SocketAddr, timeout: Duration) -> bool {
    matches!(
        time::timeout(timeout, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}
