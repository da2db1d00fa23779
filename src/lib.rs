//! Library crate for lan-discover-rs: subnet discovery and host fingerprinting.
pub mod banner;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod host;
pub mod html;
pub mod netdetect;
pub mod ports;
pub mod reach;
pub mod resolve;
pub mod scanner;
pub mod server;
pub mod types;

pub use config::{EngineConfig, ScanOptions, TlsPolicy};
pub use error::ScanError;
pub use scanner::{scan_cidr, BatchScanner, NetScanner};
pub use types::{Category, HostProbeResult, ScanReport};
