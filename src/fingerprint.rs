//! Port-set classifier.
//!
//! Rules are checked in order and the first match wins, so the most specific
//! management signals come first and a bare web port comes last.

use std::collections::BTreeSet;

use crate::ports::{
    is_http_port, COCKPIT_PORT, KUBERNETES_PORT, PROXMOX_PORT, SSH_PORT, VNC_PORT,
};
use crate::types::{Category, UNKNOWN_FINGERPRINT};

/// Best-guess device label and inventory bucket for one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub label: &'static str,
    pub category: Category,
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            label: UNKNOWN_FINGERPRINT,
            category: Category::Misc,
        }
    }
}

struct Rule {
    label: &'static str,
    category: Category,
    matches: fn(&BTreeSet<u16>) -> bool,
}

fn any_http(ports: &BTreeSet<u16>) -> bool {
    ports.iter().any(|p| is_http_port(*p))
}

static RULES: &[Rule] = &[
    Rule {
        label: "Proxmox VE",
        category: Category::Hardware,
        matches: |p| p.contains(&PROXMOX_PORT),
    },
    Rule {
        label: "Cockpit",
        category: Category::Hardware,
        matches: |p| p.contains(&COCKPIT_PORT),
    },
    Rule {
        label: "Kubernetes API",
        category: Category::Misc,
        matches: |p| p.contains(&KUBERNETES_PORT),
    },
    Rule {
        label: "VNC Host",
        category: Category::Hardware,
        matches: |p| p.contains(&VNC_PORT),
    },
    Rule {
        label: "SSH Host",
        category: Category::Hardware,
        matches: |p| p.contains(&SSH_PORT) && !any_http(p),
    },
    // Any web-capable port counts, not just 80/443, so a host with only
    // 8080 or 8443 open is a web server rather than unknown.
    Rule {
        label: "Web Server",
        category: Category::Apps,
        matches: any_http,
    },
];

/// Classify a host from its open ports.
///
/// `_http_title` is accepted so title-based rules can be added later; none of
/// the current rules look at it.
pub fn classify(open_ports: &[u16], _http_title: Option<&str>) -> Classification {
    let set: BTreeSet<u16> = open_ports.iter().copied().collect();
    RULES
        .iter()
        .find(|r| (r.matches)(&set))
        .map(|r| Classification {
            label: r.label,
            category: r.category,
        })
        .unwrap_or_default()
}
