//! Reverse name lookup for hostname resolution

use dns_lookup::lookup_addr;
use std::net::IpAddr;
use std::time::Duration;

use crate::types::StageOutcome;

/// Blocking PTR lookup. An answer that is just the address echoed back is
/// treated as no name.
pub fn reverse_lookup(ip: IpAddr) -> Option<String> {
    let name = lookup_addr(&ip).ok()?;
    let name = name.trim_end_matches('.');
    if name.is_empty() || name == ip.to_string() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Run [`reverse_lookup`] on the blocking pool, bounded by `timeout`.
///
/// The system resolver has no timeout knob of its own, so a lookup that
/// overruns is abandoned (its thread finishes in the background).
pub async fn resolve_hostname(ip: IpAddr, timeout: Duration) -> StageOutcome<String> {
    let lookup = tokio::task::spawn_blocking(move || reverse_lookup(ip));
    match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(name)) => name.into(),
        Ok(Err(e)) => StageOutcome::Fault(format!("reverse lookup worker failed: {e}")),
        Err(_) => {
            tracing::trace!(ip = %ip, "reverse lookup timed out");
            StageOutcome::Absent
        }
    }
}
