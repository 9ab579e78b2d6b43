//! arpsweep Core Library
//!
//! This crate provides the scanning engine behind the `arpsweep` binary:
//! - Network context resolution (first non-loopback IPv4 interface)
//! - Subnet enumeration with network/broadcast/loopback exclusion
//! - Concurrent ARP probing through the platform's ARP tool
//! - Result collection with an explicit completion barrier
//!
//! # Example
//!
//! ```no_run
//! use arpsweep_core::{config::ScanConfig, scanner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), arpsweep_core::ScanError> {
//!     scanner::privileges::require_elevated()?;
//!
//!     let config = ScanConfig::from_env();
//!     let summary = scanner::scan_network(&config).await?;
//!     for host in &summary.hosts {
//!         println!("{} answered", host.target);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod scanner;

// Re-export commonly used types
pub use config::{ConfigSource, ScanConfig};
pub use scanner::{
    AddressRange, NetworkContext, ProbeCapability, ProbeFailure, ProbeResult, ScanError,
    ScanProgress, ScanStage, ScanSummary,
};
