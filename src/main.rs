use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use lan_discover_rs::config::{EngineConfig, ScanOptions, TlsPolicy};
use lan_discover_rs::types::ScanReport;
use lan_discover_rs::{netdetect, server, NetScanner};

/// lan-discover-rs: find live hosts in a subnet and guess what they are.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "lan-discover-rs",
    version,
    about = "Find live hosts in a subnet, list their well-known services and guess what they are.",
    long_about = None
)]
struct Cli {
    /// CIDR block to scan (e.g., 192.168.1.0/24). If omitted, auto-detect local /24 networks.
    #[arg(long)]
    cidr: Option<String>,

    /// Max hosts probed at the same time.
    #[arg(long, default_value_t = 50)]
    concurrency: usize,

    /// Per-stage network timeout in seconds.
    #[arg(long, default_value_t = 1.0)]
    timeout: f64,

    /// Validate TLS certificates when fetching HTTPS page titles.
    #[arg(long = "strict-tls", default_value_t = false)]
    strict_tls: bool,

    /// Skip the ICMP echo and decide liveness by TCP connect only.
    #[arg(long = "no-icmp", default_value_t = false)]
    no_icmp: bool,

    /// Also print hosts that did not respond.
    #[arg(long, default_value_t = false)]
    all: bool,

    /// Write the scan report(s) as pretty JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Serve the discovery HTTP API on this address instead of scanning once.
    #[arg(long)]
    serve: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long = "json-logs", default_value_t = false)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let engine = EngineConfig {
        tls: if cli.strict_tls {
            TlsPolicy::Strict
        } else {
            TlsPolicy::Relaxed
        },
        icmp: !cli.no_icmp,
        ..EngineConfig::default()
    };
    let scanner = Arc::new(NetScanner::from_config(&engine).context("failed to build scan engine")?);

    if let Some(bind) = cli.serve.as_deref() {
        return server::spawn_server(bind, scanner).await;
    }

    let targets = match cli.cidr.clone() {
        Some(c) => vec![c],
        None => {
            let cidrs = netdetect::detect_local_cidrs().context("failed to detect local networks")?;
            if cidrs.is_empty() {
                bail!("no local IPv4 networks found; pass --cidr");
            }
            for cidr in &cidrs {
                tracing::info!(cidr = %cidr, "auto-detected local network");
            }
            cidrs.iter().map(ToString::to_string).collect()
        }
    };

    // Ctrl-C stops dispatching new hosts; in-flight hosts finish.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    let opts = ScanOptions::new(cli.concurrency, cli.timeout);
    let mut reports = Vec::with_capacity(targets.len());
    for target in &targets {
        let report = scanner
            .scan_with_cancel(target, &opts, cancel.clone())
            .await
            .with_context(|| format!("cannot scan {target}"))?;
        print_report(&report, cli.all);
        reports.push(report);
        if cancel.is_cancelled() {
            break;
        }
    }

    if let Some(path) = cli.output.as_deref() {
        write_reports_json(path, &reports)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
        println!("Wrote JSON results to {}", path.display());
    }

    Ok(())
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_report(report: &ScanReport, show_dead: bool) {
    let rows: Vec<_> = report
        .hosts
        .iter()
        .filter(|h| show_dead || h.alive || h.error.is_some())
        .collect();

    let mut ip_w = "ip".len();
    let mut ports_w = "ports".len();
    let mut fp_w = "fingerprint".len();
    let port_lists: Vec<String> = rows
        .iter()
        .map(|h| {
            h.open_ports
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect();
    for (h, ports) in rows.iter().zip(&port_lists) {
        ip_w = ip_w.max(h.ip.to_string().len());
        ports_w = ports_w.max(ports.len());
        fp_w = fp_w.max(h.fingerprint.len());
    }
    let lat_w = "latency_ms".len();

    println!(
        "\n{}: {} alive of {} hosts in {:.1} ms",
        report.cidr, report.alive, report.total, report.duration_ms
    );
    println!(
        "{:<ip_w$}  {:>lat_w$}  {:<ports_w$}  {:<fp_w$}  {:<8}  name",
        "ip", "latency_ms", "ports", "fingerprint", "type",
    );
    println!(
        "{:-<ip_w$}  {:-<lat_w$}  {:-<ports_w$}  {:-<fp_w$}  {:-<8}  {:-<4}",
        "", "", "", "", "", "",
    );
    for (h, ports) in rows.iter().zip(&port_lists) {
        let latency = h
            .latency_ms
            .map(|l| format!("{l:.2}"))
            .unwrap_or_else(|| if h.alive { "-".into() } else { "down".into() });
        let mut name = h.suggested_name.clone();
        if let Some(err) = &h.error {
            name = format!("{name} (error: {err})");
        } else if let Some(title) = &h.http_title {
            name = format!("{name} [{title}]");
        }
        println!(
            "{:<ip_w$}  {:>lat_w$}  {:<ports_w$}  {:<fp_w$}  {:<8}  {}",
            h.ip.to_string(),
            latency,
            ports,
            h.fingerprint,
            h.suggested_type.to_string(),
            name,
        );
    }
}

fn write_reports_json(path: &Path, reports: &[ScanReport]) -> Result<()> {
    let file = File::create(path)?;
    match reports {
        [single] => serde_json::to_writer_pretty(file, single)?,
        many => serde_json::to_writer_pretty(file, many)?,
    }
    Ok(())
}
