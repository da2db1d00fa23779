//! Per-host pipeline: reachability, name, ports, banners, fingerprint.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::banner::{self, TitleCollector};
use crate::config::EngineConfig;
use crate::error::ScanError;
use crate::fingerprint;
use crate::ports::{self, SSH_PORT, TITLE_PORTS};
use crate::reach::{ReachProber, Reachability};
use crate::resolve;
use crate::types::{HostProbeResult, StageOutcome};

/// The network-facing stages the orchestrator sequences for one address.
///
/// Each stage bounds its own I/O and reports a [`StageOutcome`] instead of
/// an error, so the orchestrator decides how each failure degrades.
pub trait HostStages: Send + Sync + 'static {
    fn reach(&self, ip: IpAddr, timeout: Duration) -> impl Future<Output = Reachability> + Send;

    fn hostname(&self, ip: IpAddr) -> impl Future<Output = StageOutcome<String>> + Send;

    fn open_ports(
        &self,
        ip: IpAddr,
        timeout: Duration,
    ) -> impl Future<Output = StageOutcome<Vec<u16>>> + Send;

    fn ssh_banner(
        &self,
        ip: IpAddr,
        timeout: Duration,
    ) -> impl Future<Output = StageOutcome<String>> + Send;

    fn http_title(
        &self,
        ip: IpAddr,
        port: u16,
        timeout: Duration,
    ) -> impl Future<Output = StageOutcome<String>> + Send;
}

/// Produces exactly one record for an address. Never fails.
pub trait Prober: Send + Sync + 'static {
    fn probe(&self, ip: IpAddr, timeout: Duration) -> impl Future<Output = HostProbeResult> + Send;
}

/// Real stages over TCP, ICMP, TLS and the system resolver. The ICMP
/// clients and the TLS connector are opened once and shared by all tasks.
pub struct NetStages {
    reach: ReachProber,
    titles: TitleCollector,
    catalogue: Vec<u16>,
    dns_timeout: Duration,
    banner_window: usize,
}

impl NetStages {
    /// Must run inside a Tokio runtime (the ICMP clients spawn a receiver).
    pub fn new(cfg: &EngineConfig) -> Result<Self, ScanError> {
        Ok(Self {
            reach: ReachProber::new(cfg),
            titles: TitleCollector::new(cfg)?,
            catalogue: ports::catalogue_ports(),
            dns_timeout: cfg.dns_timeout(),
            banner_window: cfg.banner_window,
        })
    }
}

impl HostStages for NetStages {
    async fn reach(&self, ip: IpAddr, timeout: Duration) -> Reachability {
        self.reach.probe(ip, timeout).await
    }

    async fn hostname(&self, ip: IpAddr) -> StageOutcome<String> {
        resolve::resolve_hostname(ip, self.dns_timeout).await
    }

    async fn open_ports(&self, ip: IpAddr, timeout: Duration) -> StageOutcome<Vec<u16>> {
        StageOutcome::Found(ports::scan_ports(ip, &self.catalogue, timeout).await)
    }

    async fn ssh_banner(&self, ip: IpAddr, timeout: Duration) -> StageOutcome<String> {
        banner::grab_ssh_banner(SocketAddr::new(ip, SSH_PORT), timeout, self.banner_window).await
    }

    async fn http_title(&self, ip: IpAddr, port: u16, timeout: Duration) -> StageOutcome<String> {
        self.titles
            .fetch_title(SocketAddr::new(ip, port), ports::is_https_port(port), timeout)
            .await
    }
}

/// Sequences [`HostStages`] into a [`HostProbeResult`].
///
/// A dead host short-circuits after the reachability stage. A port scan
/// fault fails the whole host; name, banner and title faults only drop that
/// field.
pub struct HostProber<S> {
    stages: S,
}

impl<S: HostStages> HostProber<S> {
    pub fn new(stages: S) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &S {
        &self.stages
    }

    async fn probe_alive(
        &self,
        ip: IpAddr,
        reach: Reachability,
        timeout: Duration,
    ) -> Result<HostProbeResult, String> {
        let hostname = degrade(ip, "hostname", self.stages.hostname(ip).await);

        let mut open_ports = match self.stages.open_ports(ip, timeout).await {
            StageOutcome::Found(p) => p,
            StageOutcome::Absent => Vec::new(),
            StageOutcome::Fault(reason) => return Err(format!("port scan failed: {reason}")),
        };
        open_ports.retain(|p| ports::service_label(*p).is_some());
        open_ports.sort_unstable();
        open_ports.dedup();

        let services = open_ports
            .iter()
            .filter_map(|p| ports::service_label(*p).map(|label| (*p, label.to_string())))
            .collect();

        let ssh_banner = if open_ports.contains(&SSH_PORT) {
            degrade(ip, "ssh banner", self.stages.ssh_banner(ip, timeout).await)
        } else {
            None
        };

        let mut http_title = None;
        for &port in TITLE_PORTS.iter().filter(|p| open_ports.contains(*p)) {
            match self.stages.http_title(ip, port, timeout).await {
                StageOutcome::Found(title) => {
                    http_title = Some(title);
                    break;
                }
                StageOutcome::Absent => {}
                StageOutcome::Fault(reason) => {
                    tracing::debug!(ip = %ip, port, error = %reason, "title probe faulted");
                }
            }
        }

        let class = fingerprint::classify(&open_ports, http_title.as_deref());
        let suggested_name = hostname.clone().unwrap_or_else(|| ip.to_string());

        Ok(HostProbeResult {
            ip,
            alive: true,
            latency_ms: reach.latency_ms,
            method: reach.method,
            hostname,
            open_ports,
            services,
            http_title,
            ssh_banner,
            fingerprint: class.label.to_string(),
            suggested_type: class.category,
            suggested_name,
            error: None,
        })
    }
}

impl<S: HostStages> Prober for HostProber<S> {
    async fn probe(&self, ip: IpAddr, timeout: Duration) -> HostProbeResult {
        let reach = self.stages.reach(ip, timeout).await;
        if !reach.alive {
            return HostProbeResult::unreachable(ip);
        }

        match self.probe_alive(ip, reach, timeout).await {
            Ok(result) => result,
            Err(reason) => {
                tracing::warn!(ip = %ip, error = %reason, "host pipeline faulted");
                HostProbeResult::faulted(ip, reason)
            }
        }
    }
}

/// Optional stages: a fault is logged and treated like no answer.
fn degrade<T>(ip: IpAddr, stage: &'static str, outcome: StageOutcome<T>) -> Option<T> {
    if let StageOutcome::Fault(reason) = &outcome {
        tracing::debug!(ip = %ip, stage, error = %reason, "optional stage faulted");
    }
    outcome.found()
}
