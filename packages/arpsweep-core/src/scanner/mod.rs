//! Network scanning module.
//!
//! A scan runs in four steps:
//! - resolve the local network context from the first usable interface
//! - enumerate every probeable address of that subnet
//! - dispatch one ARP probe per address through the platform tool
//! - collect every outcome and keep the hosts that answered

pub mod collect;
pub mod dispatch;
pub mod interface;
pub mod privileges;
pub mod probe;
pub mod range;

#[cfg(test)]
pub(crate) mod fake;

pub use collect::{Collected, is_reportable};
pub use dispatch::{Dispatch, DispatchOptions};
pub use interface::NetworkContext;
pub use probe::{ProbeCapability, ProbeFailure, ProbeResult};
pub use range::AddressRange;

use crate::config::ScanConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::process::Command;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

/// Candidate count above which unbounded fan-out is worth a warning
pub const LARGE_SUBNET_THRESHOLD: usize = 1024;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Create a Command that hides the console window on Windows.
#[cfg(target_os = "windows")]
pub(crate) fn hidden_command(program: &str) -> Command {
    let mut cmd = Command::new(program);
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd
}

#[cfg(not(target_os = "windows"))]
pub(crate) fn hidden_command(program: &str) -> Command {
    Command::new(program)
}

/// Scanner-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum ScanError {
    /// Elevated privileges are required for this operation
    #[error("Elevated privileges required: {message}")]
    PrivilegeRequired {
        message: String,
        platform_instructions: String,
    },

    /// The platform's interface listing failed
    #[error("Failed to enumerate network interfaces: {0}")]
    InterfaceEnumeration(String),

    /// No interface carries a usable IPv4 address
    #[error("No active non-loopback IPv4 network interface found")]
    NoInterfaceFound,

    /// No ARP probe tool is known for this platform
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The dispatcher stopped before accounting for every probe
    #[error("Probe dispatcher failed: {0}")]
    DispatchFailed(String),
}

impl ScanError {
    /// Create a privilege required error with platform-specific instructions
    pub fn privilege_required(operation: &str) -> Self {
        ScanError::PrivilegeRequired {
            message: format!(
                "The {} operation requires elevated privileges to send ARP requests.",
                operation
            ),
            platform_instructions: privileges::get_elevation_instructions(),
        }
    }

    /// Get user-friendly description and instructions
    pub fn user_message(&self) -> String {
        match self {
            ScanError::PrivilegeRequired {
                message,
                platform_instructions,
            } => {
                format!("{}\n\n{}", message, platform_instructions)
            }
            ScanError::InterfaceEnumeration(msg) => {
                format!("Could not list network interfaces: {}\n\nPlease check that the process can query the network configuration.", msg)
            }
            ScanError::NoInterfaceFound => {
                "No active network interface with an IPv4 address was found.\n\nPlease check your network connection and try again.".to_string()
            }
            ScanError::UnsupportedPlatform(os) => {
                format!("ARP scanning is not supported on '{}'.\n\nSupported platforms: Linux, macOS and other Unix systems (arping), Windows (nping).", os)
            }
            ScanError::InvalidConfig(msg) => msg.clone(),
            ScanError::DispatchFailed(msg) => {
                format!("The scan stopped unexpectedly: {}\n\nNo results were reported because the probe count is unknown.", msg)
            }
        }
    }
}

/// Progress updates during a scan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    pub stage: ScanStage,
    pub message: String,
    pub percent: Option<u8>,
    pub hosts_found: Option<usize>,
    pub elapsed_secs: f64,
}

/// Stages of the scan process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ScanStage {
    Starting,
    DetectingNetwork,
    Probing,
    Complete,
    Failed,
}

/// Callback type for scan progress updates
pub type ProgressCallback = Box<dyn Fn(ScanProgress) + Send + Sync>;

/// Callback invoked for each responding host, in arrival order
pub type HostCallback = Box<dyn FnMut(&ProbeResult) + Send>;

/// Outcome of a complete scan
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub network: NetworkContext,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    /// Addresses left after exclusions
    pub candidates: usize,
    /// Probe tasks actually launched (lower than `candidates` when cancelled)
    pub dispatched: usize,
    /// Results received by the collector
    pub received: usize,
    pub cancelled: bool,
    /// Reportable results in arrival order
    pub hosts: Vec<ProbeResult>,
}

/// Scan the local network with the platform probe tool.
pub async fn scan_network(config: &ScanConfig) -> Result<ScanSummary, ScanError> {
    scan_network_with_progress(config, None, None, CancellationToken::new()).await
}

/// Scan the local network with progress and per-host callbacks.
///
/// Cancelling `cancel` stops launching new probes; probes already running
/// still report before the summary is returned.
pub async fn scan_network_with_progress(
    config: &ScanConfig,
    on_progress: Option<ProgressCallback>,
    on_host: Option<HostCallback>,
    cancel: CancellationToken,
) -> Result<ScanSummary, ScanError> {
    let scan_start = Instant::now();

    let fail = |stage_err: ScanError| {
        let progress = ScanProgress {
            stage: ScanStage::Failed,
            message: stage_err.to_string(),
            percent: None,
            hosts_found: None,
            elapsed_secs: scan_start.elapsed().as_secs_f64(),
        };
        tracing::error!("[Scan] {}", progress.message);
        if let Some(ref callback) = on_progress {
            callback(progress);
        }
        stage_err
    };

    let emit_progress = |stage: ScanStage, message: &str, percent: Option<u8>| {
        tracing::info!("[Scan] {}", message);
        if let Some(ref callback) = on_progress {
            callback(ScanProgress {
                stage,
                message: message.to_string(),
                percent,
                hosts_found: None,
                elapsed_secs: scan_start.elapsed().as_secs_f64(),
            });
        }
    };

    emit_progress(ScanStage::Starting, "Starting ARP scan...", Some(2));
    config.validate().map_err(fail)?;

    emit_progress(
        ScanStage::DetectingNetwork,
        "Detecting network configuration...",
        Some(5),
    );

    let network = interface::resolve().map_err(fail)?;
    tracing::info!("Network: {}", network);

    let probe = probe::platform_probe(&network, config).map_err(fail)?;

    scan_with_probe(network, probe, config, on_progress, on_host, cancel).await
}

/// Run the enumerate/dispatch/collect pipeline against an already resolved
/// network using the given probe capability.
pub async fn scan_with_probe(
    network: NetworkContext,
    probe: Arc<dyn ProbeCapability>,
    config: &ScanConfig,
    on_progress: Option<ProgressCallback>,
    on_host: Option<HostCallback>,
    cancel: CancellationToken,
) -> Result<ScanSummary, ScanError> {
    let started_at = Utc::now();
    let scan_start = Instant::now();

    let fail = |err: ScanError| {
        tracing::error!("[Scan] {}", err);
        if let Some(ref callback) = on_progress {
            callback(ScanProgress {
                stage: ScanStage::Failed,
                message: err.to_string(),
                percent: None,
                hosts_found: None,
                elapsed_secs: scan_start.elapsed().as_secs_f64(),
            });
        }
        err
    };

    config.validate().map_err(fail)?;

    let emit_progress =
        |stage: ScanStage, message: &str, percent: Option<u8>, hosts: Option<usize>| {
            let progress = ScanProgress {
                stage,
                message: message.to_string(),
                percent,
                hosts_found: hosts,
                elapsed_secs: scan_start.elapsed().as_secs_f64(),
            };
            tracing::info!("[Scan] {}", message);
            if let Some(ref callback) = on_progress {
                callback(progress);
            }
        };

    let range = network.addresses();
    let candidates = range.iter().count();

    let options = config.dispatch_options();
    match options.max_concurrency {
        None if candidates > LARGE_SUBNET_THRESHOLD => tracing::warn!(
            "Unbounded fan-out over {} addresses will start {} concurrent {} processes; consider --max-concurrency",
            candidates,
            candidates,
            probe.tool()
        ),
        None => tracing::debug!("Concurrency: unbounded"),
        Some(limit) => tracing::debug!("Concurrency: at most {} probes in flight", limit),
    }
    if let Some(limit) = options.probe_timeout {
        tracing::debug!("Per-probe deadline: {}ms", limit.as_millis());
    }

    emit_progress(
        ScanStage::Probing,
        &format!(
            "Sending ARP requests to {} addresses on {} with {}...",
            candidates,
            network.cidr(),
            probe.tool()
        ),
        Some(10),
        None,
    );

    let Dispatch {
        results,
        dispatched,
    } = dispatch::dispatch(range, probe, options, cancel.clone());

    let collected = match on_host {
        Some(mut callback) => collect::collect_with(results, |result| callback(result)).await,
        None => collect::collect(results).await,
    };

    let dispatched = dispatched_count(dispatched.await).map_err(fail)?;

    if collected.received != dispatched {
        tracing::error!(
            "Collected {} results for {} dispatched probes",
            collected.received,
            dispatched
        );
    }

    let cancelled = cancel.is_cancelled() && dispatched < candidates;
    let elapsed = scan_start.elapsed();
    let message = if cancelled {
        format!(
            "Scan cancelled: {} hosts responded out of {} probed in {:.1}s",
            collected.reportable.len(),
            dispatched,
            elapsed.as_secs_f64()
        )
    } else {
        format!(
            "Scan complete: {} hosts responded out of {} probed in {:.1}s",
            collected.reportable.len(),
            dispatched,
            elapsed.as_secs_f64()
        )
    };
    emit_progress(
        ScanStage::Complete,
        &message,
        Some(100),
        Some(collected.reportable.len()),
    );

    Ok(ScanSummary {
        network,
        started_at,
        elapsed_secs: elapsed.as_secs_f64(),
        candidates,
        dispatched,
        received: collected.received,
        cancelled,
        hosts: collected.reportable,
    })
}

/// The coordinator's launch count; without it the collected results cannot
/// be trusted as complete.
fn dispatched_count(joined: Result<usize, JoinError>) -> Result<usize, ScanError> {
    joined.map_err(|e| ScanError::DispatchFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::fake::FakeProbe;
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;

    fn slash_30() -> NetworkContext {
        NetworkContext::new(
            "eth0",
            Ipv4Addr::new(192, 168, 1, 0),
            Ipv4Addr::new(255, 255, 255, 252),
        )
    }

    #[tokio::test]
    async fn test_scan_reports_only_responding_hosts() {
        let probe = FakeProbe::new()
            .respond(Ipv4Addr::new(192, 168, 1, 1), "64 bytes from 192.168.1.1")
            .fail(
                Ipv4Addr::new(192, 168, 1, 2),
                ProbeFailure::ToolNotFound {
                    tool: "arping".to_string(),
                },
            );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_callback = Arc::clone(&seen);

        let summary = scan_with_probe(
            slash_30(),
            Arc::new(probe),
            &ScanConfig::default(),
            None,
            Some(Box::new(move |result: &ProbeResult| {
                seen_in_callback.lock().unwrap().push(result.target);
            })),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.candidates, 2);
        assert_eq!(summary.dispatched, 2);
        assert_eq!(summary.received, 2);
        assert!(!summary.cancelled);
        assert_eq!(summary.hosts.len(), 1);
        assert_eq!(summary.hosts[0].target, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(*seen.lock().unwrap(), vec![Ipv4Addr::new(192, 168, 1, 1)]);
    }

    #[tokio::test]
    async fn test_scan_emits_stages_in_order() {
        let stages = Arc::new(Mutex::new(Vec::new()));
        let stages_in_callback = Arc::clone(&stages);

        scan_with_probe(
            slash_30(),
            Arc::new(FakeProbe::new()),
            &ScanConfig::default(),
            Some(Box::new(move |progress: ScanProgress| {
                stages_in_callback.lock().unwrap().push(progress.stage);
            })),
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(
            *stages.lock().unwrap(),
            vec![ScanStage::Probing, ScanStage::Complete]
        );
    }

    #[tokio::test]
    async fn test_scan_cancelled_before_start_dispatches_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = scan_with_probe(
            slash_30(),
            Arc::new(FakeProbe::new()),
            &ScanConfig::default(),
            None,
            None,
            cancel,
        )
        .await
        .unwrap();

        assert_eq!(summary.dispatched, 0);
        assert_eq!(summary.received, 0);
        assert!(summary.cancelled);
    }

    fn record_stages() -> (Arc<Mutex<Vec<ScanStage>>>, ProgressCallback) {
        let stages = Arc::new(Mutex::new(Vec::new()));
        let stages_in_callback = Arc::clone(&stages);
        let callback: ProgressCallback = Box::new(move |progress: ScanProgress| {
            stages_in_callback.lock().unwrap().push(progress.stage);
        });
        (stages, callback)
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_detecting_network() {
        let (stages, callback) = record_stages();
        let config = ScanConfig::default().with_overrides(Some(0), None);

        let result =
            scan_network_with_progress(&config, Some(callback), None, CancellationToken::new())
                .await;

        assert!(matches!(result, Err(ScanError::InvalidConfig(_))));
        assert_eq!(
            *stages.lock().unwrap(),
            vec![ScanStage::Starting, ScanStage::Failed]
        );
    }

    #[tokio::test]
    async fn test_oversized_concurrency_limit_fails_instead_of_empty_scan() {
        let (stages, callback) = record_stages();
        let probe = Arc::new(FakeProbe::new());
        let config = ScanConfig::default().with_overrides(Some(usize::MAX), None);

        let result = scan_with_probe(
            slash_30(),
            Arc::clone(&probe) as Arc<dyn ProbeCapability>,
            &config,
            Some(callback),
            None,
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(ScanError::InvalidConfig(_))));
        assert_eq!(*stages.lock().unwrap(), vec![ScanStage::Failed]);
        assert_eq!(probe.peak_in_flight.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispatcher_panic_is_a_scan_error() {
        let crashed: Result<usize, JoinError> =
            tokio::spawn(async { panic!("coordinator exploded") }).await;
        assert!(matches!(
            dispatched_count(crashed),
            Err(ScanError::DispatchFailed(_))
        ));

        let finished = tokio::spawn(async { 7usize }).await;
        assert_eq!(dispatched_count(finished).unwrap(), 7);
    }

    #[test]
    fn test_user_message_includes_instructions() {
        let err = ScanError::privilege_required("ARP scan");
        let msg = err.user_message();
        assert!(msg.starts_with("The ARP scan operation requires elevated privileges"));
        assert!(msg.contains("\n\n"));
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let summary = ScanSummary {
            network: slash_30(),
            started_at: Utc::now(),
            elapsed_secs: 0.5,
            candidates: 2,
            dispatched: 2,
            received: 2,
            cancelled: false,
            hosts: vec![ProbeResult::success(
                Ipv4Addr::new(192, 168, 1, 1),
                "reply".to_string(),
            )],
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["network"]["interface"], "eth0");
        assert_eq!(json["network"]["baseAddress"], "192.168.1.0");
        assert_eq!(json["hosts"][0]["target"], "192.168.1.1");
        assert!(json["startedAt"].is_string());
    }
}
