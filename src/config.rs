//! Per-call scan options and engine-wide settings.

use serde::Deserialize;
use std::time::Duration;

use crate::error::{Result, ScanError};

/// Knobs for one batch call. Shared by the CLI and the HTTP request body.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ScanOptions {
    /// Upper bound on hosts probed at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-stage network timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout: f64,
}

impl ScanOptions {
    pub fn new(concurrency: usize, timeout: f64) -> Self {
        Self {
            concurrency,
            timeout,
        }
    }

    /// Timeout as a `Duration`, rejecting zero, negative and non-finite values.
    pub fn timeout_duration(&self) -> Result<Duration> {
        if !self.timeout.is_finite() || self.timeout <= 0.0 {
            return Err(ScanError::InvalidTimeout(self.timeout));
        }
        Duration::try_from_secs_f64(self.timeout).map_err(|_| ScanError::InvalidTimeout(self.timeout))
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::new(default_concurrency(), default_timeout_secs())
    }
}

/// Whether HTTPS title probes validate the peer certificate.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TlsPolicy {
    /// Accept self-signed and mismatched certificates. Discovery targets are
    /// mostly internal hosts with self-issued certificates.
    #[default]
    Relaxed,
    /// Validate certificate chain and hostname.
    Strict,
}

/// Settings fixed when the engine is constructed.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub tls: TlsPolicy,

    /// Try an ICMP echo before the TCP fallback.
    #[serde(default = "default_true")]
    pub icmp: bool,

    /// Port used by the TCP liveness fallback.
    #[serde(default = "default_fallback_port")]
    pub fallback_port: u16,

    /// Bound for reverse name lookups, which take no caller timeout.
    #[serde(default = "default_dns_timeout_ms")]
    pub dns_timeout_ms: u64,

    /// Max bytes read from the SSH identification port.
    #[serde(default = "default_banner_window")]
    pub banner_window: usize,

    /// Max HTTP body bytes inspected for a `<title>`.
    #[serde(default = "default_body_window")]
    pub body_window: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl EngineConfig {
    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tls: TlsPolicy::default(),
            icmp: default_true(),
            fallback_port: default_fallback_port(),
            dns_timeout_ms: default_dns_timeout_ms(),
            banner_window: default_banner_window(),
            body_window: default_body_window(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_concurrency() -> usize {
    50
}

fn default_timeout_secs() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_fallback_port() -> u16 {
    80
}

fn default_dns_timeout_ms() -> u64 {
    2000
}

fn default_banner_window() -> usize {
    256
}

fn default_body_window() -> usize {
    4096
}

fn default_user_agent() -> String {
    concat!("lan-discover-rs/", env!("CARGO_PKG_VERSION")).to_string()
}
