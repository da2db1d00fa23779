use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

/// Label used whenever nothing more specific can be said about a host.
pub const UNKNOWN_FINGERPRINT: &str = "Unknown";

/// Coarse inventory bucket proposed for a discovered host.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Hardware,
    Apps,
    #[default]
    Misc,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::Hardware => "hardware",
            Category::Apps => "apps",
            Category::Misc => "misc",
        })
    }
}

/// Which path decided liveness for a host.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReachMethod {
    Icmp,
    Tcp,
    #[default]
    None,
}

/// What one per-host stage produced.
///
/// `Absent` is the normal negative answer (closed, silent, no record).
/// `Fault` means the stage itself broke; the orchestrator decides per stage
/// whether that degrades to `Absent` or fails the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome<T> {
    Found(T),
    Absent,
    Fault(String),
}

impl<T> StageOutcome<T> {
    /// Collapse to an option, dropping the fault reason.
    pub fn found(self) -> Option<T> {
        match self {
            StageOutcome::Found(v) => Some(v),
            StageOutcome::Absent | StageOutcome::Fault(_) => None,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, StageOutcome::Fault(_))
    }
}

impl<T> From<Option<T>> for StageOutcome<T> {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => StageOutcome::Found(v),
            None => StageOutcome::Absent,
        }
    }
}

/// One fingerprinted record per scanned address.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HostProbeResult {
    pub ip: IpAddr,
    pub alive: bool,
    pub latency_ms: Option<f64>,
    #[serde(default)]
    pub method: ReachMethod,
    pub hostname: Option<String>,
    pub open_ports: Vec<u16>,
    pub services: BTreeMap<u16, String>,
    pub http_title: Option<String>,
    pub ssh_banner: Option<String>,
    pub fingerprint: String,
    pub suggested_type: Category,
    pub suggested_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HostProbeResult {
    /// Record for an address that did not answer the reachability probe.
    pub fn unreachable(ip: IpAddr) -> Self {
        Self {
            ip,
            alive: false,
            latency_ms: None,
            method: ReachMethod::None,
            hostname: None,
            open_ports: Vec::new(),
            services: BTreeMap::new(),
            http_title: None,
            ssh_banner: None,
            fingerprint: UNKNOWN_FINGERPRINT.to_string(),
            suggested_type: Category::Misc,
            suggested_name: ip.to_string(),
            error: None,
        }
    }

    /// Degraded record for a host whose pipeline faulted.
    pub fn faulted(ip: IpAddr, reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::unreachable(ip)
        }
    }
}

/// Outcome of one batch scan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub cidr: String,
    pub hosts: Vec<HostProbeResult>,
    pub total: usize,
    pub alive: usize,
    pub duration_ms: f64,
    pub started_at: String,
}
