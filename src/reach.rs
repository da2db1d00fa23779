//! Host liveness: one ICMP echo, falling back to a TCP connect.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use surge_ping::{Client, Config, PingIdentifier, PingSequence, ICMP};

use crate::config::EngineConfig;
use crate::ports;
use crate::types::ReachMethod;

/// Liveness verdict for one address.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reachability {
    pub alive: bool,
    /// Round-trip time, only known when ICMP answered.
    pub latency_ms: Option<f64>,
    pub method: ReachMethod,
}

impl Reachability {
    pub fn dead() -> Self {
        Self {
            alive: false,
            latency_ms: None,
            method: ReachMethod::None,
        }
    }
}

/// ICMP echo prober with a TCP fallback.
///
/// ICMP sockets usually need `CAP_NET_RAW` (or an unprivileged ping group),
/// which containers often lack. When a client cannot be opened the prober
/// only uses the TCP path.
pub struct ReachProber {
    v4: Option<Client>,
    v6: Option<Client>,
    fallback_port: u16,
    next_ident: AtomicU16,
}

impl ReachProber {
    /// Open the ICMP clients. Must run inside a Tokio runtime.
    pub fn new(cfg: &EngineConfig) -> Self {
        let (v4, v6) = if cfg.icmp {
            (open_client(ICMP::V4, "v4"), open_client(ICMP::V6, "v6"))
        } else {
            (None, None)
        };
        Self {
            v4,
            v6,
            fallback_port: cfg.fallback_port,
            next_ident: AtomicU16::new(1),
        }
    }

    /// Prober that never attempts ICMP.
    pub fn tcp_only(fallback_port: u16) -> Self {
        Self {
            v4: None,
            v6: None,
            fallback_port,
            next_ident: AtomicU16::new(1),
        }
    }

    pub fn icmp_available(&self) -> bool {
        self.v4.is_some() || self.v6.is_some()
    }

    /// Decide whether `ip` is up. Never fails: an unanswered probe is a dead host.
    pub async fn probe(&self, ip: IpAddr, timeout: Duration) -> Reachability {
        if let Some(rtt) = self.echo(ip, timeout).await {
            return Reachability {
                alive: true,
                latency_ms: Some((rtt.as_secs_f64() * 100_000.0).round() / 100.0),
                method: ReachMethod::Icmp,
            };
        }

        let alive = ports::connect(SocketAddr::new(ip, self.fallback_port), timeout).await;
        Reachability {
            alive,
            latency_ms: None,
            method: ReachMethod::Tcp,
        }
    }

    async fn echo(&self, ip: IpAddr, timeout: Duration) -> Option<Duration> {
        let client = match ip {
            IpAddr::V4(_) => self.v4.as_ref(),
            IpAddr::V6(_) => self.v6.as_ref(),
        }?;
        let ident = self.next_ident.fetch_add(1, Ordering::Relaxed);
        let mut pinger = client.pinger(ip, PingIdentifier(ident)).await;
        pinger.timeout(timeout);
        match pinger.ping(PingSequence(0), &[0u8; 56]).await {
            Ok((_, rtt)) => Some(rtt),
            Err(e) => {
                tracing::trace!(ip = %ip, error = %e, "icmp echo failed, trying tcp");
                None
            }
        }
    }
}

fn open_client(kind: ICMP, family: &str) -> Option<Client> {
    let config = Config::builder().kind(kind).build();
    match Client::new(&config) {
        Ok(c) => Some(c),
        Err(e) => {
            tracing::warn!(
                family,
                error = %e,
                "ICMP client unavailable, liveness falls back to TCP connect"
            );
            None
        }
    }
}
