//! Error types surfaced to callers before a batch starts.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    #[error("'cidr' is required")]
    MissingCidr,

    #[error("invalid CIDR {input:?}: {reason}")]
    InvalidCidr { input: String, reason: String },

    #[error("prefix length /{prefix} is too wide (must be >= /{min}, at most 65536 addresses)")]
    PrefixTooWide { prefix: u8, min: u8 },

    #[error("timeout must be a positive number of seconds, got {0}")]
    InvalidTimeout(f64),

    #[error("TLS connector setup failed: {0}")]
    Tls(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
