use lan_discover_rs::host::{HostProber, HostStages, Prober};
use lan_discover_rs::reach::Reachability;
use lan_discover_rs::scanner::{BatchScanner, CANCELLED};
use lan_discover_rs::types::{Category, HostProbeResult, ReachMethod, StageOutcome};
use lan_discover_rs::{ScanError, ScanOptions};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn last_octet(ip: IpAddr) -> u8 {
    match ip {
        IpAddr::V4(v4) => v4.octets()[3],
        IpAddr::V6(v6) => v6.octets()[15],
    }
}

/// Fake network keyed on the last octet of 10.1.1.0/29:
/// .1 ssh box, .2 proxmox, .3 port scan faults, .4 dead, .5 web, .6 silent.
/// Lower octets answer later so completion order is reversed.
struct FakeNet;

impl HostStages for FakeNet {
    async fn reach(&self, ip: IpAddr, _t: Duration) -> Reachability {
        let o = last_octet(ip);
        tokio::time::sleep(Duration::from_millis(u64::from(8 - o.min(7)) * 5)).await;
        if o == 4 {
            return Reachability::dead();
        }
        Reachability {
            alive: true,
            latency_ms: None,
            method: ReachMethod::Tcp,
        }
    }

    async fn hostname(&self, ip: IpAddr) -> StageOutcome<String> {
        match last_octet(ip) {
            2 => StageOutcome::Found("pve.lan".into()),
            6 => StageOutcome::Fault("resolver exploded".into()),
            _ => StageOutcome::Absent,
        }
    }

    async fn open_ports(&self, ip: IpAddr, _t: Duration) -> StageOutcome<Vec<u16>> {
        match last_octet(ip) {
            1 => StageOutcome::Found(vec![22]),
            2 => StageOutcome::Found(vec![8006, 22]),
            3 => StageOutcome::Fault("forced failure".into()),
            5 => StageOutcome::Found(vec![80, 22]),
            _ => StageOutcome::Found(vec![]),
        }
    }

    async fn ssh_banner(&self, _ip: IpAddr, _t: Duration) -> StageOutcome<String> {
        StageOutcome::Found("SSH-2.0-fake".into())
    }

    async fn http_title(&self, _ip: IpAddr, port: u16, _t: Duration) -> StageOutcome<String> {
        match port {
            80 => StageOutcome::Found("nginx".into()),
            _ => StageOutcome::Absent,
        }
    }
}

fn opts(concurrency: usize) -> ScanOptions {
    ScanOptions::new(concurrency, 0.2)
}

#[tokio::test]
async fn every_host_reported_once_in_address_order() {
    let scanner = BatchScanner::new(HostProber::new(FakeNet));
    let report = scanner.scan("10.1.1.0/29", &opts(50)).await.unwrap();

    assert_eq!(report.cidr, "10.1.1.0/29");
    assert_eq!(report.total, 6);
    assert_eq!(report.hosts.len(), 6);
    let octets: Vec<u8> = report.hosts.iter().map(|h| last_octet(h.ip)).collect();
    assert_eq!(octets, vec![1, 2, 3, 4, 5, 6]);
    let distinct: HashSet<IpAddr> = report.hosts.iter().map(|h| h.ip).collect();
    assert_eq!(distinct.len(), 6);
    // .3 faulted and .4 is dead; the rest are alive.
    assert_eq!(report.alive, 4);
}

#[tokio::test]
async fn classifications_and_fault_isolation() {
    let scanner = BatchScanner::new(HostProber::new(FakeNet));
    let hosts = scanner.scan("10.1.1.0/29", &opts(3)).await.unwrap().hosts;

    let by = |o: u8| hosts.iter().find(|h| last_octet(h.ip) == o).unwrap();

    assert_eq!(by(1).fingerprint, "SSH Host");
    assert_eq!(by(1).ssh_banner.as_deref(), Some("SSH-2.0-fake"));

    assert_eq!(by(2).fingerprint, "Proxmox VE");
    assert_eq!(by(2).suggested_type, Category::Hardware);
    assert_eq!(by(2).suggested_name, "pve.lan");
    assert_eq!(by(2).open_ports, vec![22, 8006]);

    let faulted = by(3);
    assert!(!faulted.alive);
    assert_eq!(faulted.error.as_deref(), Some("port scan failed: forced failure"));
    assert_eq!(faulted.fingerprint, "Unknown");

    assert_eq!(*by(4), HostProbeResult::unreachable(by(4).ip));

    assert_eq!(by(5).fingerprint, "Web Server");
    assert_eq!(by(5).suggested_type, Category::Apps);
    assert_eq!(by(5).http_title.as_deref(), Some("nginx"));

    // A resolver fault only drops the hostname.
    assert!(by(6).alive && by(6).error.is_none() && by(6).hostname.is_none());
    assert_eq!(by(6).fingerprint, "Unknown");
    assert_eq!(by(6).suggested_type, Category::Misc);
}

#[tokio::test]
async fn record_invariants_hold() {
    let scanner = BatchScanner::new(HostProber::new(FakeNet));
    let report = scanner.scan("10.1.1.0/29", &opts(2)).await.unwrap();
    let catalogue = lan_discover_rs::ports::catalogue_ports();

    for h in &report.hosts {
        assert!(!h.fingerprint.is_empty());
        assert!(h.open_ports.windows(2).all(|w| w[0] < w[1]));
        assert!(h.open_ports.iter().all(|p| catalogue.contains(p)));
        assert_eq!(h.services.keys().copied().collect::<Vec<_>>(), h.open_ports);
        if !h.alive {
            assert!(h.open_ports.is_empty() && h.services.is_empty());
            assert!(h.http_title.is_none() && h.ssh_banner.is_none());
            assert_eq!(h.fingerprint, "Unknown");
            assert_eq!(h.suggested_type, Category::Misc);
        }
    }
}

/// Counts probes in flight and the high-water mark.
#[derive(Default)]
struct Gauge {
    calls: AtomicUsize,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Prober for Gauge {
    async fn probe(&self, ip: IpAddr, _t: Duration) -> HostProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(15)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        HostProbeResult::unreachable(ip)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_bound_is_respected() {
    let scanner = BatchScanner::new(Gauge::default());
    let report = scanner.scan("10.2.0.0/27", &opts(4)).await.unwrap();
    assert_eq!(report.total, 30);
    let peak = scanner.prober().peak.load(Ordering::SeqCst);
    assert!((1..=4).contains(&peak), "peak {peak}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pool_never_exceeds_host_count() {
    let scanner = BatchScanner::new(Gauge::default());
    let report = scanner.scan("10.2.0.0/30", &opts(100)).await.unwrap();
    assert_eq!(report.total, 2);
    assert!(scanner.prober().peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn single_host_block_and_zero_concurrency_still_run() {
    let scanner = BatchScanner::new(Gauge::default());
    let report = scanner.scan("10.3.3.3/32", &opts(0)).await.unwrap();
    assert_eq!(report.total, 1);
    assert_eq!(report.hosts[0].ip.to_string(), "10.3.3.3");
    assert_eq!(scanner.prober().calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_input_is_rejected_before_any_probe() {
    let scanner = BatchScanner::new(Gauge::default());

    let too_wide = scanner.scan("10.0.0.0/8", &opts(10)).await;
    assert_eq!(too_wide, Err(ScanError::PrefixTooWide { prefix: 8, min: 16 }));

    let garbage = scanner.scan("10.0.0.0/abc", &opts(10)).await;
    assert!(matches!(garbage, Err(ScanError::InvalidCidr { .. })));

    let bad_timeout = scanner
        .scan("10.0.0.0/30", &ScanOptions::new(10, -1.0))
        .await;
    assert!(matches!(bad_timeout, Err(ScanError::InvalidTimeout(_))));

    assert_eq!(scanner.prober().calls.load(Ordering::SeqCst), 0);
}

/// Panics for one address.
struct Grenade;

impl Prober for Grenade {
    async fn probe(&self, ip: IpAddr, _t: Duration) -> HostProbeResult {
        if last_octet(ip) == 2 {
            panic!("boom at {ip}");
        }
        HostProbeResult::unreachable(ip)
    }
}

#[tokio::test]
async fn panicking_host_does_not_abort_batch() {
    let scanner = BatchScanner::new(Grenade);
    let report = scanner.scan("10.4.0.0/29", &opts(8)).await.unwrap();
    assert_eq!(report.total, 6);
    let broken: Vec<_> = report.hosts.iter().filter(|h| h.error.is_some()).collect();
    assert_eq!(broken.len(), 1);
    assert_eq!(last_octet(broken[0].ip), 2);
    assert!(broken[0].error.as_deref().unwrap().starts_with("host task failed"));
}

#[tokio::test]
async fn cancelled_scan_still_reports_every_address() {
    let scanner = BatchScanner::new(Gauge::default());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = scanner
        .scan_with_cancel("10.5.0.0/28", &opts(4), cancel)
        .await
        .unwrap();
    assert_eq!(report.total, 14);
    assert!(report.hosts.windows(2).all(|w| w[0].ip < w[1].ip));
    assert!(report
        .hosts
        .iter()
        .all(|h| h.error.as_deref() == Some(CANCELLED)));
    assert_eq!(scanner.prober().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn report_serializes_with_wire_names() {
    let scanner = BatchScanner::new(HostProber::new(FakeNet));
    let report = scanner.scan("10.1.1.0/29", &opts(6)).await.unwrap();
    let v = serde_json::to_value(&report).unwrap();
    assert_eq!(v["total"], 6);
    assert_eq!(v["hosts"][1]["fingerprint"], "Proxmox VE");
    assert_eq!(v["hosts"][1]["services"]["8006"], "Proxmox");
    assert_eq!(v["hosts"][1]["suggested_type"], "hardware");
    assert!(v["duration_ms"].as_f64().unwrap() >= 0.0);
}
