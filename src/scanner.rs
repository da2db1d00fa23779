use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use ::time::{format_description::well_known, OffsetDateTime};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{EngineConfig, ScanOptions};
use crate::error::Result;
use crate::host::{HostProber, NetStages, Prober};
use crate::netdetect;
use crate::types::{HostProbeResult, ScanReport};

/// Hard ceiling on simultaneous host pipelines, whatever the caller asks for.
///
/// Each live host opens one socket per catalogue port during its port scan,
/// so a full pool needs far more descriptors than the default `ulimit -n`.
pub const MAX_WORKERS: usize = 5_000;

/// Error text for addresses skipped because the scan was cancelled.
pub const CANCELLED: &str = "scan cancelled";

/// Scanner wired to the real network stages.
pub type NetScanner = BatchScanner<HostProber<NetStages>>;

/// Expands a CIDR block and fingerprints every usable address on a bounded
/// worker pool.
///
/// The pool is sized per call and dropped when the call returns; the scanner
/// itself (and the prober's sockets/TLS state) can be reused across calls.
pub struct BatchScanner<P> {
    prober: Arc<P>,
}

impl NetScanner {
    /// Build the network engine. Must run inside a Tokio runtime.
    pub fn from_config(cfg: &EngineConfig) -> Result<Self> {
        Ok(Self::new(HostProber::new(NetStages::new(cfg)?)))
    }
}

impl<P: Prober> BatchScanner<P> {
    pub fn new(prober: P) -> Self {
        Self {
            prober: Arc::new(prober),
        }
    }

    pub fn prober(&self) -> &P {
        &self.prober
    }

    /// Scan every usable host in `cidr`.
    ///
    /// Input is validated before any I/O. Once started the scan always
    /// returns one record per usable address, sorted by address.
    pub async fn scan(&self, cidr: &str, opts: &ScanOptions) -> Result<ScanReport> {
        self.scan_with_cancel(cidr, opts, CancellationToken::new())
            .await
    }

    /// Like [`scan`](Self::scan), but addresses not yet started when `cancel`
    /// fires are reported as faulted records instead of being probed.
    pub async fn scan_with_cancel(
        &self,
        cidr: &str,
        opts: &ScanOptions,
        cancel: CancellationToken,
    ) -> Result<ScanReport> {
        let net = netdetect::parse_cidr(cidr)?;
        let timeout = opts.timeout_duration()?;
        let targets = netdetect::usable_hosts(net);
        let workers = pool_size(opts.concurrency, targets.len());

        let started_at = now_rfc3339();
        let start = Instant::now();
        tracing::info!(
            cidr = %net,
            hosts = targets.len(),
            workers,
            timeout_ms = timeout.as_millis() as u64,
            "starting discovery scan"
        );

        let hosts = self.run(&targets, workers, timeout, &cancel).await;

        let alive = hosts.iter().filter(|h| h.alive).count();
        let duration_ms = (start.elapsed().as_secs_f64() * 10_000.0).round() / 10.0;
        tracing::info!(
            cidr = %net,
            total = hosts.len(),
            alive,
            duration_ms,
            cancelled = cancel.is_cancelled(),
            "discovery scan complete"
        );

        Ok(ScanReport {
            cidr: net.to_string(),
            total: hosts.len(),
            alive,
            hosts,
            duration_ms,
            started_at,
        })
    }

    async fn run(
        &self,
        targets: &[IpAddr],
        workers: usize,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Vec<HostProbeResult> {
        let sem = Arc::new(Semaphore::new(workers));
        let mut set = JoinSet::new();
        let mut results = Vec::with_capacity(targets.len());

        for &ip in targets {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                p = sem.clone().acquire_owned() => p.ok(),
            };
            let Some(permit) = permit else {
                results.push(HostProbeResult::faulted(ip, CANCELLED));
                continue;
            };

            let prober = Arc::clone(&self.prober);
            set.spawn(async move {
                let _permit = permit; // keep permit until the host pipeline finishes

                // Inner task so a panicking pipeline surfaces as a JoinError
                // tied to this address.
                let pipeline = tokio::spawn(async move { prober.probe(ip, timeout).await });
                match pipeline.await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::warn!(ip = %ip, error = %e, "host task failed");
                        HostProbeResult::faulted(ip, format!("host task failed: {e}"))
                    }
                }
            });
        }

        while let Some(res) = set.join_next().await {
            match res {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!(error = %e, "scan worker failed"),
            }
        }

        fill_missing(targets, &mut results);
        results.sort_by_key(|r| r.ip);
        results
    }
}

/// Worker count for a batch: the request, capped by host count and
/// [`MAX_WORKERS`], never below one.
pub fn pool_size(requested: usize, hosts: usize) -> usize {
    requested.min(hosts).min(MAX_WORKERS).max(1)
}

/// Guarantee one record per target even if a worker vanished.
fn fill_missing(targets: &[IpAddr], results: &mut Vec<HostProbeResult>) {
    if results.len() >= targets.len() {
        return;
    }
    let seen: HashSet<IpAddr> = results.iter().map(|r| r.ip).collect();
    for &ip in targets {
        if !seen.contains(&ip) {
            results.push(HostProbeResult::faulted(ip, "host task lost"));
        }
    }
}

/// Validate input, build the network engine with default settings and scan
/// one block.
pub async fn scan_cidr(cidr: &str, concurrency: usize, timeout_secs: f64) -> Result<ScanReport> {
    let opts = ScanOptions::new(concurrency, timeout_secs);
    netdetect::parse_cidr(cidr)?;
    opts.timeout_duration()?;
    let scanner = NetScanner::from_config(&EngineConfig::default())?;
    scanner.scan(cidr, &opts).await
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
